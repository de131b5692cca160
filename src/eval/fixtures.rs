//! Built-in evaluation suites.

use std::fmt;
use std::str::FromStr;

use crate::eval::metrics::{
    GEval, answer_relevancy, bias, correctness, correctness_rubric, faithfulness, toxicity,
};
use crate::eval::test_case::TestCase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteName {
    Arithmetic,
    Legal,
    Dialogue,
    Faithfulness,
}

impl SuiteName {
    pub const ALL: [SuiteName; 4] = [
        SuiteName::Arithmetic,
        SuiteName::Legal,
        SuiteName::Dialogue,
        SuiteName::Faithfulness,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arithmetic => "arithmetic",
            Self::Legal => "legal",
            Self::Dialogue => "dialogue",
            Self::Faithfulness => "faithfulness",
        }
    }

    pub fn suite(self) -> Suite {
        match self {
            Self::Arithmetic => arithmetic(),
            Self::Legal => legal(),
            Self::Dialogue => dialogue(),
            Self::Faithfulness => faithfulness_check(),
        }
    }
}

impl fmt::Display for SuiteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuiteName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|suite| suite.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                let known = Self::ALL.map(SuiteName::as_str).join(", ");
                format!("unknown suite '{value}' (expected one of: {known})")
            })
    }
}

/// Cases plus the metrics they are scored with.
#[derive(Debug, Clone)]
pub struct Suite {
    pub name: SuiteName,
    pub cases: Vec<TestCase>,
    pub metrics: Vec<GEval>,
    /// Run through `assert_test` rather than `evaluate`.
    pub assert_style: bool,
}

pub fn arithmetic() -> Suite {
    Suite {
        name: SuiteName::Arithmetic,
        cases: vec![
            TestCase::new("1+1=?", "3").expected("2"),
            TestCase::new("1+1=?", "2").expected("2"),
            TestCase::new("What is the capital of France?", "Paris").expected("Paris"),
            TestCase::new("What is the capital of France?", "London").expected("Paris"),
        ],
        metrics: vec![correctness(0.5)],
        assert_style: false,
    }
}

pub fn legal() -> Suite {
    let rows = [
        (
            "100001",
            "Which clauses must an employment contract contain?",
            "Probation, in full the suspended execution of a sentence, means that an offender \
             convicted through lawful procedure is declared guilty while the sentence is not \
             carried out for now. Below are its conditions, enforcement and legal consequences:",
            "An employment contract must name the worker and state the job duties, pay and term.",
        ),
        (
            "100002",
            "What is individual income tax?",
            "Individual income tax is levied by the state on income obtained by individuals, \
             including wages and salaries, remuneration for services and property rentals.",
            "Individual income tax is levied on personal income such as wages, bonuses and \
             investment gains.",
        ),
        (
            "100003",
            "What documents are needed to register a company?",
            "Company registration requires: 1. a name pre-approval notice 2. shareholder \
             identification 3. proof of registered capital 4. articles of association \
             5. proof of registered address 6. appointment papers of the legal representative.",
            "Registering a company requires shareholder IDs, articles of association, proof of \
             address and a name approval notice.",
        ),
        (
            "100004",
            "What forms of liability exist for breach of contract?",
            "The weather is lovely today, sunny and bright, perfect for an outing. Everyone \
             should get outside and enjoy the day.",
            "Liability for breach includes continued performance, remedial measures, damages \
             and liquidated damages.",
        ),
        (
            "100005",
            "What is intellectual property?",
            "Intellectual property is the exclusive right people hold by law over the results \
             of their intellectual work, usually covering copyright, patents and trademarks. \
             It protects innovators and encourages invention.",
            "Intellectual property is an exclusive right over intellectual creations, including \
             patents, trademarks and copyright, that protects innovation.",
        ),
        (
            "100006",
            "How is property divided in a divorce?",
            "Under the Civil Code, joint marital property is handled by agreement of both \
             parties; failing agreement, the court decides according to the circumstances, \
             protecting the interests of the children, the wife and the party not at fault.",
            "Division follows the parties' agreement first; otherwise the court decides while \
             protecting the children, the wife and the party not at fault.",
        ),
        (
            "100007",
            "What is the age of criminal responsibility?",
            "The age of criminal responsibility is the minimum age at which a person can bear \
             criminal liability. The Criminal Law holds anyone aged 16 or over liable; those \
             aged 14 to 16 are liable for serious crimes such as intentional homicide.",
            "It is the minimum age for criminal liability, generally 16, with 14 to 16 year \
             olds liable only for serious crimes.",
        ),
        (
            "100008",
            "How is the validity of a home purchase contract determined?",
            "A home purchase contract is valid when: 1. the parties have the required civil \
             capacity 2. the intent expressed is genuine 3. it does not violate mandatory law \
             4. the subject matter is lawful.",
            "Validity requires capable parties, genuine intent, no violation of law and a \
             lawful subject matter.",
        ),
        (
            "100009",
            "What is an administrative penalty?",
            "An administrative penalty is a sanction by which an administrative authority \
             punishes citizens, legal persons or organisations violating administrative order \
             by reducing their rights or adding obligations, including warnings, fines, \
             confiscation of illegal gains and orders to suspend business.",
            "An administrative penalty is an authority's sanction for a violation, including \
             warnings, fines, confiscation and suspension of business.",
        ),
        (
            "100010",
            "How long does copyright protection last?",
            "I don't know the exact period, but I think it should be long, maybe several \
             decades. I'm not really sure though, you should look up the relevant law.",
            "Copyright lasts for the author's life plus 50 years after death; works of legal \
             persons are protected for 50 years after first publication.",
        ),
    ];

    Suite {
        name: SuiteName::Legal,
        cases: rows
            .into_iter()
            .map(|(id, input, actual, expected)| {
                TestCase::new(input, actual)
                    .expected(expected)
                    .named(id)
                    .tagged("legal")
            })
            .collect(),
        metrics: vec![correctness_rubric(0.5)],
        assert_style: false,
    }
}

pub fn dialogue() -> Suite {
    Suite {
        name: SuiteName::Dialogue,
        cases: vec![
            TestCase::new(
                "What is an employment contract?",
                "An employment contract is an agreement by which an employer and a worker \
                 establish an employment relationship and set out their rights and duties. \
                 It must cover the worker's details, job duties, place and hours of work, pay \
                 and social insurance.",
            )
            .expected(
                "An agreement establishing the employment relationship and the parties' rights \
                 and duties, covering worker details, duties, place, hours and pay.",
            ),
            TestCase::new(
                "How is individual income tax calculated?",
                "The weather is lovely today, sunny and bright, perfect for an outing. Everyone \
                 should do more outdoor exercise.",
            )
            .expected(
                "It uses progressive rates: tax = (total income - basic deduction - special \
                 deductions) x rate - quick deduction.",
            ),
            TestCase::new(
                "What documents are needed to register a company?",
                "You need an alien identity card, a Martian household register, a copy of a \
                 galactic business licence and a time-travel permit from the future, all \
                 certified by the lunar commerce bureau.",
            )
            .expected(
                "Shareholder IDs, articles of association, proof of address and a name approval \
                 notice, submitted to the commerce authority.",
            ),
            TestCase::new(
                "What forms of liability exist for breach of contract?",
                "Liability for breach mainly takes the form of continued performance, remedial \
                 measures, damages and liquidated damages; which applies depends on the nature, \
                 extent and consequences of the breach.",
            )
            .expected(
                "Continued performance, remedial measures, damages and liquidated damages, \
                 depending on the breach and the contract terms.",
            ),
        ],
        metrics: vec![answer_relevancy(0.7), bias(0.3), toxicity(0.3)],
        assert_style: false,
    }
}

pub fn faithfulness_check() -> Suite {
    Suite {
        name: SuiteName::Faithfulness,
        cases: vec![
            TestCase::new(
                "What is the capital of the Earth?",
                "The Earth is a planet and has no capital.",
            )
            .with_context([
                "The capital of China is Beijing.",
                "The capital of the United States is Washington.",
            ]),
        ],
        metrics: vec![faithfulness(0.7)],
        assert_style: true,
    }
}

#[cfg(test)]
mod tests {
    use super::SuiteName;
    use crate::eval::metrics::Metric;
    use crate::eval::test_case::TestCaseParam;

    #[test]
    fn suite_names_parse_case_insensitively() {
        assert_eq!("Legal".parse::<SuiteName>(), Ok(SuiteName::Legal));
        let err = "nope".parse::<SuiteName>().expect_err("unknown suite");
        assert!(err.contains("arithmetic, legal, dialogue, faithfulness"));
    }

    #[test]
    fn suites_have_the_expected_shape() {
        let legal = SuiteName::Legal.suite();
        assert_eq!(legal.cases.len(), 10);
        assert_eq!(legal.cases[0].label(0), "100001");
        assert_eq!(legal.cases[9].label(9), "100010");

        let dialogue = SuiteName::Dialogue.suite();
        let names = dialogue.metrics.iter().map(|metric| metric.name()).collect::<Vec<_>>();
        assert_eq!(names, ["Answer Relevancy", "Bias", "Toxicity"]);

        assert_eq!(SuiteName::Arithmetic.suite().cases.len(), 4);
    }

    #[test]
    fn every_case_has_the_fields_its_metrics_need() {
        for name in SuiteName::ALL {
            let suite = name.suite();
            for case in &suite.cases {
                for metric in &suite.metrics {
                    assert!(
                        metric.judge_prompt(case).is_ok(),
                        "{name}: {} cannot score {:?}",
                        metric.name(),
                        case.name
                    );
                }
            }
        }
        let faithfulness = SuiteName::Faithfulness.suite();
        assert!(faithfulness.assert_style);
        assert!(TestCaseParam::Context.extract(&faithfulness.cases[0]).is_some());
    }
}
