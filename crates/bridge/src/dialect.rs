//! Kernel names and notebook metadata per target language

use matbridge_codec::Dialect;

/// A target language as the notebook host sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageSpec {
    pub dialect: Dialect,
    /// Kernel names that run this language
    pub kernels: &'static [&'static str],
    /// Cell background colour in the notebook
    pub background_color: &'static str,
}

pub const SUPPORTED_LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        dialect: Dialect::Matlab,
        kernels: &["imatlab", "matlab"],
        background_color: "#8ee7f1",
    },
    LanguageSpec {
        dialect: Dialect::Octave,
        kernels: &["octave"],
        background_color: "#dff8fb",
    },
];

/// Language run by `kernel_name`, ignoring ASCII case
pub fn lookup(kernel_name: &str) -> Option<&'static LanguageSpec> {
    SUPPORTED_LANGUAGES.iter().find(|spec| {
        spec.kernels
            .iter()
            .any(|k| k.eq_ignore_ascii_case(kernel_name))
    })
}
