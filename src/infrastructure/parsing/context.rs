//! Parsing context shared by every extraction strategy

/// Per-run information strategies may need besides the document
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    /// Configured source id (`logammulia`, `galeri24`)
    pub source_id: String,

    /// Vendor applied to tuples that name no vendor
    pub default_vendor: Option<String>,
}

impl ParseContext {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            default_vendor: None,
        }
    }

    pub fn with_default_vendor(mut self, vendor: Option<String>) -> Self {
        self.default_vendor = vendor;
        self
    }
}
