//! Clone naming templates
//!
//! `{name}` expands to the source resource's name and `{n}` to its
//! 1-based position in the batch. A template without placeholders is a
//! literal name and can only name a single clone.

use super::LifecycleError;
use std::collections::HashSet;

const NAME_PLACEHOLDER: &str = "{name}";
const INDEX_PLACEHOLDER: &str = "{n}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneNaming {
    template: String,
}

impl CloneNaming {
    pub fn parse(template: &str) -> Result<Self, LifecycleError> {
        let template = template.trim();
        if template.is_empty() {
            return Err(LifecycleError::EmptyCloneName);
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_literal(&self) -> bool {
        !self.template.contains(NAME_PLACEHOLDER) && !self.template.contains(INDEX_PLACEHOLDER)
    }

    /// Expand both placeholders in one pass; substituted text is never rescanned.
    pub fn expand(&self, source_name: &str, index: usize) -> String {
        let position = (index + 1).to_string();
        let mut out = String::with_capacity(self.template.len() + source_name.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(NAME_PLACEHOLDER) {
                out.push_str(source_name);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(INDEX_PLACEHOLDER) {
                out.push_str(&position);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }

    /// Target names for a batch, in order.
    ///
    /// Fails when two clones would share a name or a clone would take its
    /// source's name.
    pub fn plan<'a, I>(&self, source_names: I) -> Result<Vec<String>, LifecycleError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let sources: Vec<&str> = source_names.into_iter().collect();

        if self.is_literal() && sources.len() > 1 {
            return Err(LifecycleError::CloneNameCollision {
                name: self.template.clone(),
                count: sources.len(),
            });
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            let target = self.expand(source, index);
            if target == *source {
                return Err(LifecycleError::CloneNameMatchesSource { name: target });
            }
            if !seen.insert(target.clone()) {
                let count = sources
                    .iter()
                    .enumerate()
                    .filter(|(i, s)| self.expand(s, *i) == target)
                    .count();
                return Err(LifecycleError::CloneNameCollision { name: target, count });
            }
            targets.push(target);
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_single_ok() {
        let naming = CloneNaming::parse("web-clone").unwrap();
        assert!(naming.is_literal());
        assert_eq!(naming.plan(["web-01"]).unwrap(), vec!["web-clone"]);
    }

    #[test]
    fn test_literal_batch_rejected() {
        let naming = CloneNaming::parse("web-clone").unwrap();
        assert_eq!(
            naming.plan(["web-01", "web-02"]),
            Err(LifecycleError::CloneNameCollision {
                name: "web-clone".to_string(),
                count: 2
            })
        );
    }

    #[test]
    fn test_templates_expand() {
        let naming = CloneNaming::parse("{name}-copy").unwrap();
        assert_eq!(
            naming.plan(["web-01", "web-02"]).unwrap(),
            vec!["web-01-copy", "web-02-copy"]
        );

        let naming = CloneNaming::parse("lab-{n}").unwrap();
        assert_eq!(naming.plan(["a", "b", "c"]).unwrap(), vec!["lab-1", "lab-2", "lab-3"]);
    }

    #[test]
    fn test_source_name_is_not_rescanned() {
        let naming = CloneNaming::parse("{name}-{n}").unwrap();
        assert_eq!(naming.expand("lab-{n}", 0), "lab-{n}-1");
        assert_eq!(naming.expand("a{name}b", 1), "a{name}b-2");

        let naming = CloneNaming::parse("{{n}}-{nam").unwrap();
        assert_eq!(naming.expand("web", 2), "{3}-{nam");
    }

    #[test]
    fn test_name_only_template_rejected() {
        let naming = CloneNaming::parse("{name}").unwrap();
        assert!(matches!(
            naming.plan(["web-01"]),
            Err(LifecycleError::CloneNameMatchesSource { .. })
        ));
    }

    #[test]
    fn test_empty_template_rejected() {
        assert_eq!(CloneNaming::parse("  "), Err(LifecycleError::EmptyCloneName));
    }
}
