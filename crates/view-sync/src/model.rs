use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one node in the host page's tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural pattern used to find nodes. The two shapes this system needs:
/// a class set (the host-page anchor) and attribute presence (the injected
/// marker).
#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    Classes(Vec<String>),
    Attr { key: String },
}

impl Selector {
    pub fn classes<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Classes(classes.into_iter().map(Into::into).collect())
    }

    pub fn attr(key: impl Into<String>) -> Self {
        Self::Attr { key: key.into() }
    }
}

/// Declarative description of an element subtree to insert.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementSpec {
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_classes(mut self, classes: &[String]) -> Self {
        self.classes.extend(classes.iter().cloned());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_spec_builder_accumulates() {
        let spec = ElementSpec::new("button")
            .with_class("a")
            .with_class("b")
            .with_attr("type", "button")
            .with_child(ElementSpec::new("span").with_text("hi"));

        assert_eq!(spec.tag, "button");
        assert_eq!(spec.classes, vec!["a", "b"]);
        assert_eq!(spec.attrs, vec![("type".to_string(), "button".to_string())]);
        assert_eq!(spec.children.len(), 1);
        assert_eq!(spec.children[0].text.as_deref(), Some("hi"));
    }

    #[test]
    fn selector_constructors() {
        assert_eq!(
            Selector::classes(["x", "y"]),
            Selector::Classes(vec!["x".to_string(), "y".to_string()])
        );
        assert_eq!(
            Selector::attr("data-thing"),
            Selector::Attr {
                key: "data-thing".to_string()
            }
        );
    }
}
