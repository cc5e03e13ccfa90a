use super::decode::DEFAULT_MAX_DECODED_BYTES;

/// Settings for one validation run.
///
/// ```
/// use pdf_conform::ValidatorConfig;
///
/// let config = ValidatorConfig::default().with_show_fonts(false).with_max_fonts(50);
/// assert!(!config.show_fonts);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Report fonts at all
    pub show_fonts: bool,
    /// Stop enumerating fonts after this many
    pub max_fonts: usize,
    /// Depth ceiling for page, outline and name trees
    pub max_tree_depth: usize,
    /// Ceiling for chasing compressed objects through object streams
    pub max_object_stream_depth: usize,
    /// Ceiling on the decoded size of any one stream
    pub max_decoded_bytes: usize,
    pub compute_checksums: bool,
    pub check_profiles: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            show_fonts: true,
            max_fonts: 1000,
            max_tree_depth: 100,
            max_object_stream_depth: 10,
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
            compute_checksums: true,
            check_profiles: true,
        }
    }
}

impl ValidatorConfig {
    pub fn with_show_fonts(mut self, show: bool) -> Self {
        self.show_fonts = show;
        self
    }

    pub fn with_max_fonts(mut self, max: usize) -> Self {
        self.max_fonts = max;
        self
    }

    pub fn with_max_tree_depth(mut self, depth: usize) -> Self {
        self.max_tree_depth = depth;
        self
    }

    pub fn with_max_object_stream_depth(mut self, depth: usize) -> Self {
        self.max_object_stream_depth = depth;
        self
    }

    pub fn with_max_decoded_bytes(mut self, max: usize) -> Self {
        self.max_decoded_bytes = max;
        self
    }

    pub fn with_checksums(mut self, compute: bool) -> Self {
        self.compute_checksums = compute;
        self
    }

    pub fn with_profiles(mut self, check: bool) -> Self {
        self.check_profiles = check;
        self
    }
}
