//! Bridge behaviour against a scripted kernel

use matbridge::{
    BridgeConfig, CellRequest, Completion, HostKernel, KernelError, MatlabBridge, Message,
    MessageKind, VariableStore,
};
use matbridge_core::{MapKey, Mapping, Value};
use serial_test::serial;
use std::collections::HashMap;
use std::path::Path;

/// Records every request and answers `get_response` from a script
#[derive(Default)]
struct FakeKernel {
    cells: Vec<CellRequest>,
    queries: Vec<String>,
    responses: HashMap<String, Vec<Message>>,
    warnings: Vec<String>,
    fail_cells: bool,
    disconnected: bool,
}

impl FakeKernel {
    fn respond(&mut self, code: &str, chunks: &[&str]) {
        self.responses.insert(
            code.to_string(),
            chunks.iter().map(|c| Message::stdout(*c)).collect(),
        );
    }

    fn codes(&self) -> Vec<&str> {
        self.cells.iter().map(|c| c.code.as_str()).collect()
    }
}

impl HostKernel for FakeKernel {
    fn run_cell(&mut self, request: &CellRequest) -> Result<Completion, KernelError> {
        if self.disconnected {
            return Err(KernelError::Disconnected);
        }
        self.cells.push(request.clone());
        if self.fail_cells {
            Ok(Completion::Error {
                name: "error".to_string(),
                message: "boom".to_string(),
            })
        } else {
            Ok(Completion::Ok)
        }
    }

    fn get_response(
        &mut self,
        code: &str,
        kinds: &[MessageKind],
        stream: &str,
    ) -> Result<Vec<Message>, KernelError> {
        if self.disconnected {
            return Err(KernelError::Disconnected);
        }
        self.queries.push(code.to_string());
        Ok(self
            .responses
            .get(code)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|m| kinds.contains(&m.kind) && m.name == stream)
            .collect())
    }

    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}

fn bridge(kernel: &str, dir: &Path) -> MatlabBridge {
    let config = BridgeConfig::new()
        .with_kernel(kernel)
        .with_staging_dir(dir)
        .with_install_helpers(false);
    MatlabBridge::new(&config).unwrap()
}

fn store(vars: Vec<(&str, Value)>) -> VariableStore {
    vars.into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

// ============================================================================
// get_vars
// ============================================================================

#[test]
fn test_get_scalar_runs_assignment() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel::default();

    b.get_vars(&mut kernel, &store(vec![("x", Value::Int(42))]), &["x"], None)
        .unwrap();

    assert_eq!(kernel.cells.len(), 1);
    let cell = &kernel.cells[0];
    assert_eq!(cell.code, "x = 42");
    assert!(cell.store_history);
    assert!(!cell.silent);
    assert_eq!(
        cell.on_error.as_deref(),
        Some("Failed to get variable x of type int to Octave")
    );
    assert!(kernel.warnings.is_empty());
}

#[test]
fn test_get_sequences_and_literals() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("matlab", tmp.path());
    let mut kernel = FakeKernel::default();
    let vars = store(vec![
        (
            "nums",
            Value::Seq(vec![Value::Int(1), Value::Float(2.5), Value::Bool(true)]),
        ),
        ("mixed", Value::Seq(vec![Value::Int(1), Value::str("a")])),
        ("empty", Value::Seq(vec![])),
        ("nothing", Value::Null),
        ("quote", Value::str("it's")),
    ]);

    b.get_vars(
        &mut kernel,
        &vars,
        &["nums", "mixed", "empty", "nothing", "quote"],
        None,
    )
    .unwrap();

    assert_eq!(
        kernel.codes(),
        vec![
            "nums = [1;2.5;true]",
            "mixed = {1;'a'}",
            "empty = []",
            "nothing = NaN",
            "quote = 'it''s'",
        ]
    );
}

#[test]
fn test_get_leading_underscore_is_renamed() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel::default();

    b.get_vars(
        &mut kernel,
        &store(vec![("_hidden", Value::Bool(false))]),
        &["_hidden"],
        None,
    )
    .unwrap();

    assert_eq!(kernel.codes(), vec!["m_hidden = false"]);
    assert_eq!(
        kernel.warnings,
        vec!["Variable _hidden is passed from the host to kernel octave as m_hidden"]
    );
}

#[test]
fn test_get_as_var() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel::default();

    b.get_vars(
        &mut kernel,
        &store(vec![("_x", Value::Float(0.5))]),
        &["_x"],
        Some("y"),
    )
    .unwrap();

    assert_eq!(kernel.codes(), vec!["y = 0.5"]);
    assert!(kernel.warnings.is_empty());
}

#[test]
fn test_get_missing_and_unsupported_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel::default();

    let mut bad_keys = Mapping::new();
    bad_keys.insert(MapKey::Int(1), Value::Int(2));
    let vars = store(vec![("bad", Value::Map(bad_keys)), ("ok", Value::Int(1))]);

    b.get_vars(&mut kernel, &vars, &["missing", "bad", "ok"], None)
        .unwrap();

    assert_eq!(kernel.codes(), vec!["ok = 1"]);
    assert_eq!(kernel.warnings.len(), 2);
    assert!(kernel.warnings[0].contains("missing"));
    assert!(
        kernel.warnings[1].starts_with("Failed to get variable bad of type dict to Octave")
    );
}

#[test]
fn test_get_mapping_is_staged() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel::default();
    let vars = store(vec![(
        "s",
        Value::map([("a", Value::Int(1)), ("b", Value::str("two"))]),
    )]);

    b.get_vars(&mut kernel, &vars, &["s"], None).unwrap();
    b.get_vars(&mut kernel, &vars, &["s"], None).unwrap();

    let codes = kernel.codes();
    assert!(codes[0].starts_with("s = getfield(load(fullfile('"));
    assert!(codes[0].ends_with("'), 'obj')"));
    // Each exchange stages its own file
    assert_ne!(codes[0], codes[1]);

    let staged: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("dict2mtlb-") && n.ends_with(".mat"))
        .collect();
    assert_eq!(staged.len(), 2);
}

#[test]
fn test_get_failed_cell_does_not_stop_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel {
        fail_cells: true,
        ..FakeKernel::default()
    };
    let vars = store(vec![("a", Value::Int(1)), ("b", Value::Int(2))]);

    b.get_vars(&mut kernel, &vars, &["a", "b"], None).unwrap();
    assert_eq!(kernel.codes(), vec!["a = 1", "b = 2"]);
}

#[test]
fn test_get_disconnect_propagates() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel {
        disconnected: true,
        ..FakeKernel::default()
    };

    let err = b
        .get_vars(&mut kernel, &store(vec![("a", Value::Int(1))]), &["a"], None)
        .unwrap_err();
    assert!(matches!(err, KernelError::Disconnected));
}

// ============================================================================
// put_vars
// ============================================================================

#[test]
fn test_put_concatenates_chunks() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("matlab", tmp.path());
    let mut kernel = FakeKernel::default();
    kernel.respond(
        "disp(matbridge_py_repr(x))",
        &["{'a': 1", ", 'b': [True, False]}", "\n"],
    );

    let result = b.put_vars(&mut kernel, &["x"], None).unwrap();

    assert_eq!(
        result.get("x"),
        Some(&Value::map([
            ("a", Value::Int(1)),
            ("b", Value::Seq(vec![Value::Bool(true), Value::Bool(false)])),
        ]))
    );
    assert!(kernel.warnings.is_empty());
}

#[test]
fn test_put_failure_drops_only_that_variable() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel::default();
    kernel.respond("disp(matbridge_py_repr(good))", &["2.5\n"]);
    kernel.respond("disp(matbridge_py_repr(bad))", &["unsupported('function_handle')\n"]);

    let result = b.put_vars(&mut kernel, &["bad", "good"], None).unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.get("good"), Some(&Value::Float(2.5)));
    assert_eq!(kernel.warnings.len(), 1);
    assert!(
        kernel.warnings[0]
            .starts_with("Failed to evaluate \"unsupported('function_handle')\": ")
    );
}

#[test]
fn test_put_as_var() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel::default();
    kernel.respond("disp(matbridge_py_repr(x))", &["'hello'\n"]);

    let result = b.put_vars(&mut kernel, &["x"], Some("greeting")).unwrap();
    assert_eq!(result.get("greeting"), Some(&Value::str("hello")));
    assert_eq!(result.get("x"), None);
}

#[test]
fn test_put_discovers_prefixed_variables() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel::default();
    kernel.respond("disp(strjoin(who('sos*')', ' '))", &["sos_a sos_b\n"]);
    kernel.respond("disp(matbridge_py_repr(sos_a))", &["1\n"]);
    kernel.respond("disp(matbridge_py_repr(sos_b))", &["None\n"]);

    let result = b.put_vars(&mut kernel, &[], None).unwrap();

    assert_eq!(result.names().collect::<Vec<_>>(), vec!["sos_a", "sos_b"]);
    assert_eq!(result.get("sos_a"), Some(&Value::Int(1)));
    assert_eq!(result.get("sos_b"), Some(&Value::Null));
}

#[test]
fn test_put_rejects_invalid_names_without_running_code() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel::default();

    let result = b.put_vars(&mut kernel, &["x); delete('f'"], None).unwrap();
    assert!(result.is_empty());
    assert!(kernel.queries.is_empty());
    assert_eq!(kernel.warnings.len(), 1);
}

#[test]
fn test_put_reads_staged_mat_file() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());

    // Stage a value the way get_vars would, then point the literal at it
    let mut kernel = FakeKernel::default();
    let vars = store(vec![("s", Value::map([("k", Value::Float(1.5))]))]);
    b.get_vars(&mut kernel, &vars, &["s"], None).unwrap();
    let staged = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|x| x == "mat"))
        .unwrap();

    let literal = format!(
        "sio.loadmat({})['obj']",
        matbridge_core::quote_host_str(staged.to_str().unwrap())
    );
    kernel.respond("disp(matbridge_py_repr(s))", &[literal.as_str(), "\n"]);
    let result = b.put_vars(&mut kernel, &["s"], None).unwrap();
    assert_eq!(
        result.get("s"),
        Some(&Value::map([("k", Value::Float(1.5))]))
    );
}

// ============================================================================
// Session
// ============================================================================

#[test]
fn test_sessioninfo_concatenates_stdout() {
    let tmp = tempfile::tempdir().unwrap();
    let b = bridge("octave", tmp.path());
    let mut kernel = FakeKernel::default();
    kernel.respond("ver", &["GNU Octave Version: 9.2.0\n", "Operating system: Linux\n"]);

    let info = b.sessioninfo(&mut kernel).unwrap();
    assert_eq!(info, "GNU Octave Version: 9.2.0\nOperating system: Linux\n");
}

#[test]
#[serial]
fn test_env_overrides() {
    let tmp = tempfile::tempdir().unwrap();
    // SAFETY: serialized with the other environment tests
    unsafe {
        std::env::set_var("MATBRIDGE_STAGING_DIR", tmp.path());
        std::env::set_var("MATBRIDGE_OCTAVE", "flatpak run org.octave.Octave");
    }
    let config = BridgeConfig::from_toml_str("staging_dir = \"/ignored\"")
        .unwrap()
        .with_env_overrides();
    unsafe {
        std::env::remove_var("MATBRIDGE_STAGING_DIR");
        std::env::remove_var("MATBRIDGE_OCTAVE");
    }

    assert_eq!(config.staging_root(), tmp.path());
    assert_eq!(config.octave_command, "flatpak run org.octave.Octave");
}

#[test]
#[serial]
fn test_empty_env_values_are_ignored() {
    // SAFETY: serialized with the other environment tests
    unsafe {
        std::env::set_var("MATBRIDGE_STAGING_DIR", "");
        std::env::remove_var("MATBRIDGE_OCTAVE");
    }
    let config = BridgeConfig::new().with_env_overrides();
    unsafe {
        std::env::remove_var("MATBRIDGE_STAGING_DIR");
    }

    assert_eq!(config.staging_dir, None);
    assert_eq!(config.octave_command, "octave-cli");
}
