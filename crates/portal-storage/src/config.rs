use typed_builder::TypedBuilder;

/// Boundary configuration consumed by the storage layer.
///
/// Supplied by the embedding application's config loader; every field has
/// a default so tests and small deployments can build one in a line.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StoreConfig {
    /// Prefix prepended verbatim to every generated short code.
    #[builder(setter(into), default = "http://localhost:8080/".to_string())]
    pub base_url: String,

    /// Length of generated short codes. Callers must supply at least 4;
    /// the generator itself does not enforce this.
    #[builder(default = 5)]
    pub uid_length: usize,

    /// Database connection string. Empty selects the in-memory backend.
    #[builder(setter(into), default)]
    pub dsn: String,

    /// Snapshot file path for the in-memory backend. Empty disables
    /// persistence.
    #[builder(setter(into), default)]
    pub snapshot_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
