//! Prompt templates with `{name}` placeholders.
//!
//! `{{` and `}}` render as literal braces. Templates are parsed once when
//! built, so malformed braces fail early and rendering only has to look up
//! variables.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::rchain::messages::{ChatMessage, ChatRequest, Role};

/// Substitution variables keyed by placeholder name.
pub type PromptValues = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("missing template variable '{name}'")]
    MissingVariable { name: String },
    #[error("unclosed '{{' at byte {position}")]
    UnclosedPlaceholder { position: usize },
    #[error("unmatched '}}' at byte {position}; use '}}}}' for a literal brace")]
    UnmatchedBrace { position: usize },
    #[error("empty placeholder at byte {position}")]
    EmptyPlaceholder { position: usize },
    #[error("unknown message role '{role}'")]
    UnknownRole { role: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Skeleton {
    segments: Vec<Segment>,
}

impl Skeleton {
    fn parse(text: &str) -> Result<Self, PromptError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((position, ch)) = chars.next() {
            match ch {
                '{' if chars.peek().is_some_and(|(_, next)| *next == '{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().is_some_and(|(_, next)| *next == '}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        if inner == '{' {
                            return Err(PromptError::UnclosedPlaceholder { position });
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(PromptError::UnclosedPlaceholder { position });
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(PromptError::EmptyPlaceholder { position });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(name.to_string()));
                }
                '}' => return Err(PromptError::UnmatchedBrace { position }),
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    fn format(&self, values: &PromptValues) -> Result<String, PromptError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| PromptError::MissingVariable { name: name.clone() })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// Single-message template; renders to one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    skeleton: Skeleton,
}

impl PromptTemplate {
    pub fn from_template(text: &str) -> Result<Self, PromptError> {
        Ok(Self {
            skeleton: Skeleton::parse(text)?,
        })
    }

    /// Declared variable names, sorted and de-duplicated.
    pub fn input_variables(&self) -> Vec<String> {
        collect_variables([&self.skeleton])
    }

    pub fn format(&self, values: &PromptValues) -> Result<String, PromptError> {
        self.skeleton.format(values)
    }

    pub fn render(&self, values: &PromptValues) -> Result<ChatRequest, PromptError> {
        Ok(ChatRequest::from(self.format(values)?))
    }
}

/// Ordered role-tagged templates, e.g. a system instruction followed by `{question}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPromptTemplate {
    messages: Vec<(Role, Skeleton)>,
}

impl ChatPromptTemplate {
    /// Builds from `(role, text)` pairs; roles accept `human`/`ai` aliases.
    pub fn from_messages<R, T>(pairs: impl IntoIterator<Item = (R, T)>) -> Result<Self, PromptError>
    where
        R: AsRef<str>,
        T: AsRef<str>,
    {
        let mut messages = Vec::new();
        for (role, text) in pairs {
            let role = role
                .as_ref()
                .parse::<Role>()
                .map_err(|role| PromptError::UnknownRole { role })?;
            messages.push((role, Skeleton::parse(text.as_ref())?));
        }
        Ok(Self { messages })
    }

    /// System instruction followed by a human turn holding `{question}`.
    pub fn assistant_qa(system: &str) -> Result<Self, PromptError> {
        Self::from_messages([("system", system), ("human", "{question}")])
    }

    pub fn input_variables(&self) -> Vec<String> {
        collect_variables(self.messages.iter().map(|(_, skeleton)| skeleton))
    }

    pub fn render(&self, values: &PromptValues) -> Result<ChatRequest, PromptError> {
        let messages = self
            .messages
            .iter()
            .map(|(role, skeleton)| Ok(ChatMessage::new(*role, skeleton.format(values)?)))
            .collect::<Result<Vec<_>, PromptError>>()?;
        Ok(ChatRequest::new(messages))
    }
}

fn collect_variables<'a>(skeletons: impl IntoIterator<Item = &'a Skeleton>) -> Vec<String> {
    skeletons
        .into_iter()
        .flat_map(Skeleton::variables)
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Builds [`PromptValues`] from `key=value` pairs.
pub fn values_from_pairs<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> PromptValues {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ChatPromptTemplate, PromptError, PromptTemplate, values_from_pairs};
    use crate::rchain::messages::Role;

    #[test]
    fn renders_question_into_user_message() {
        let template = PromptTemplate::from_template("Q: {question}").expect("template parses");
        let request = template
            .render(&values_from_pairs([("question", "2+2?")]))
            .expect("render succeeds");

        assert_eq!(request.messages().len(), 1);
        assert_eq!(request.messages()[0].role, Role::User);
        assert_eq!(request.messages()[0].content, "Q: 2+2?");
    }

    #[test]
    fn rendering_is_idempotent() {
        let template = ChatPromptTemplate::assistant_qa("You are a helpful assistant.")
            .expect("template parses");
        let values = values_from_pairs([("question", "Which providers offer LLMs?")]);

        let first = template.render(&values).expect("first render");
        let second = template.render(&values).expect("second render");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_variable_is_reported_by_name() {
        let template = PromptTemplate::from_template("Context: {context}\nQuestion: {question}")
            .expect("template parses");
        let err = template
            .render(&values_from_pairs([("question", "why?")]))
            .expect_err("context is missing");
        assert_eq!(
            err,
            PromptError::MissingVariable {
                name: "context".to_string()
            }
        );
    }

    #[test]
    fn doubled_braces_are_literals() {
        let template =
            PromptTemplate::from_template("{{\"answer\": \"{ answer }\"}}").expect("parses");
        assert_eq!(template.input_variables(), vec!["answer".to_string()]);
        let text = template
            .format(&values_from_pairs([("answer", "4")]))
            .expect("format succeeds");
        assert_eq!(text, "{\"answer\": \"4\"}");
    }

    #[test]
    fn malformed_braces_fail_at_parse_time() {
        assert_eq!(
            PromptTemplate::from_template("oops {name").unwrap_err(),
            PromptError::UnclosedPlaceholder { position: 5 }
        );
        assert_eq!(
            PromptTemplate::from_template("a } b").unwrap_err(),
            PromptError::UnmatchedBrace { position: 2 }
        );
        assert_eq!(
            PromptTemplate::from_template("x {  } y").unwrap_err(),
            PromptError::EmptyPlaceholder { position: 2 }
        );
    }

    #[test]
    fn chat_template_collects_variables_across_messages() {
        let template = ChatPromptTemplate::from_messages([
            ("system", "Answer in {language}."),
            ("human", "{question} ({language})"),
        ])
        .expect("parses");
        assert_eq!(
            template.input_variables(),
            vec!["language".to_string(), "question".to_string()]
        );
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = ChatPromptTemplate::from_messages([("narrator", "hi")]).unwrap_err();
        assert_eq!(
            err,
            PromptError::UnknownRole {
                role: "narrator".to_string()
            }
        );
    }

    #[test]
    fn extra_values_are_ignored() {
        let template = PromptTemplate::from_template("Hi {name}").expect("parses");
        let text = template
            .format(&values_from_pairs([("name", "Ada"), ("unused", "x")]))
            .expect("format succeeds");
        assert_eq!(text, "Hi Ada");
    }
}
