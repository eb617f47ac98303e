pub use anyhow::{Error, Result, anyhow, bail};
pub use async_trait::async_trait;
pub use schemars::JsonSchema;
pub use serde_json::Value;
pub use tokio;

pub mod json;
pub mod sync;
pub mod utils;

/// Collision-resistant ids for freshly created nodes and edges.
pub fn create_id() -> String {
    cuid2::create_id()
}

#[cfg(test)]
mod tests {
    use super::create_id;

    #[test]
    fn test_create_id_is_unique() {
        let a = create_id();
        let b = create_id();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }
}
