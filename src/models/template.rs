use serde::Serialize;

/// Canned starting text for a feedback comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedbackTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub content: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemplateCategory {
    pub key: &'static str,
    pub name: &'static str,
    pub templates: &'static [FeedbackTemplate],
}

/// A template together with the category it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategorizedTemplate {
    #[serde(flatten)]
    pub template: FeedbackTemplate,
    pub category_key: &'static str,
    pub category_name: &'static str,
}
