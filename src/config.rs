use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of list elements or entities resolved at once.
    #[serde(default)]
    pub worker_limit: Option<usize>,

    #[serde(default = "default_catalogue_size")]
    pub catalogue_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_limit: None,
            catalogue_size: default_catalogue_size(),
        }
    }
}

fn default_catalogue_size() -> usize {
    10
}
