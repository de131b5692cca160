use serde::Serialize;

/// One evaluated interaction: what was asked, what came back, what was expected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TestCase {
    pub name: Option<String>,
    pub input: String,
    pub actual_output: String,
    pub expected_output: Option<String>,
    /// Ground-truth context the answer should stay faithful to.
    pub context: Vec<String>,
    /// Documents a retrieval step supplied to the model.
    pub retrieval_context: Vec<String>,
    pub tags: Vec<String>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, actual_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            actual_output: actual_output.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn expected(mut self, expected_output: impl Into<String>) -> Self {
        self.expected_output = Some(expected_output.into());
        self
    }

    pub fn with_context<I, S>(mut self, context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context = context.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retrieval_context<I, S>(mut self, retrieval_context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retrieval_context = retrieval_context.into_iter().map(Into::into).collect();
        self
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Display label: the case name, or its 1-based position.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("case-{}", index + 1))
    }
}

/// Test case fields a metric can show to the judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseParam {
    Input,
    ActualOutput,
    ExpectedOutput,
    Context,
    RetrievalContext,
}

impl TestCaseParam {
    pub fn label(self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::ActualOutput => "Actual Output",
            Self::ExpectedOutput => "Expected Output",
            Self::Context => "Context",
            Self::RetrievalContext => "Retrieval Context",
        }
    }

    /// Field value rendered for a judge prompt; `None` when the case lacks it.
    pub fn extract(self, case: &TestCase) -> Option<String> {
        match self {
            Self::Input => Some(case.input.clone()),
            Self::ActualOutput => Some(case.actual_output.clone()),
            Self::ExpectedOutput => case.expected_output.clone(),
            Self::Context => join_non_empty(&case.context),
            Self::RetrievalContext => join_non_empty(&case.retrieval_context),
        }
    }
}

fn join_non_empty(items: &[String]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    Some(
        items
            .iter()
            .enumerate()
            .map(|(index, item)| format!("{}. {item}", index + 1))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}
