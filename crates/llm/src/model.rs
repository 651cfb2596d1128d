#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

pub fn default_gemini_models() -> Vec<Model> {
    vec![
        Model::from_id("gemini-2.5-flash").with_description("Fast default for chat"),
        Model::from_id("gemini-2.5-pro").with_description("Higher quality, slower"),
        Model::from_id("gemini-2.0-flash").with_description("Previous generation flash"),
    ]
}

/// Picks the requested model id, falling back to `default` when it is blank.
pub fn resolve_model_id(requested: &str, default: &str) -> String {
    let requested = requested.trim();
    if requested.is_empty() {
        default.to_string()
    } else {
        requested.to_string()
    }
}
