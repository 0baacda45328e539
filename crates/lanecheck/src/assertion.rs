//! Assertion engine.
//!
//! A closed set of [`Predicate`]s evaluated against a [`Subject`] tagged by
//! kind. Evaluation is pure and synchronous over already-resolved values;
//! retrying belongs to the caller (see `Session::expect_eventually`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::network::{HttpMethod, RecordedCall};
use crate::result::{LanecheckError, LanecheckResult};

/// Snapshot of one element's observable state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    /// Tag name
    pub tag: String,
    /// Text content of the subtree
    pub text: String,
    /// Rendered and not hidden by any ancestor
    pub visible: bool,
    /// Attributes
    pub attributes: BTreeMap<String, String>,
}

/// Value an expectation is evaluated against
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    /// A resolved element
    Element(ElementState),
    /// Number of matched elements or recorded calls
    Count(usize),
    /// A recorded network call
    Call(RecordedCall),
    /// Any other value
    Scalar(Value),
}

impl Subject {
    /// Subject kind name
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Element(_) => "element",
            Self::Count(_) => "count",
            Self::Call(_) => "call",
            Self::Scalar(_) => "scalar",
        }
    }
}

impl From<ElementState> for Subject {
    fn from(value: ElementState) -> Self {
        Self::Element(value)
    }
}

impl From<usize> for Subject {
    fn from(value: usize) -> Self {
        Self::Count(value)
    }
}

impl From<RecordedCall> for Subject {
    fn from(value: RecordedCall) -> Self {
        Self::Call(value)
    }
}

impl From<Value> for Subject {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

/// Closed set of checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Element is visible
    Visible,
    /// Element is hidden
    Hidden,
    /// Element text, count, or scalar is non-empty
    NotEmpty,
    /// Element text contains
    TextContains(String),
    /// Trimmed element text equals
    TextEquals(String),
    /// Element carries the attribute
    HasAttribute(String),
    /// Element attribute equals
    AttributeEquals {
        /// Attribute name
        name: String,
        /// Expected value
        value: String,
    },
    /// Count equals
    CountEquals(usize),
    /// Count is strictly greater
    CountGreaterThan(usize),
    /// Count is at least
    CountAtLeast(usize),
    /// Call method equals
    MethodIs(HttpMethod),
    /// Call URL contains
    UrlContains(String),
    /// Call body is an object with the key
    BodyHasKey(String),
    /// Call body is an object with exactly these keys
    BodyKeysExactly(Vec<String>),
    /// Call body field equals
    BodyFieldEquals {
        /// Field name
        key: String,
        /// Expected value
        value: Value,
    },
    /// Call response status equals
    StatusIs(u16),
    /// Scalar equals
    Equals(Value),
    /// Scalar number is strictly greater
    GreaterThan(f64),
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visible => f.write_str("be.visible"),
            Self::Hidden => f.write_str("be.hidden"),
            Self::NotEmpty => f.write_str("not.be.empty"),
            Self::TextContains(_) => f.write_str("contain.text"),
            Self::TextEquals(_) => f.write_str("have.text"),
            Self::HasAttribute(name) | Self::AttributeEquals { name, .. } => {
                write!(f, "have.attr[{name}]")
            }
            Self::CountEquals(_) => f.write_str("have.length"),
            Self::CountGreaterThan(_) => f.write_str("have.length.greaterThan"),
            Self::CountAtLeast(_) => f.write_str("have.length.at.least"),
            Self::MethodIs(_) => f.write_str("request.method"),
            Self::UrlContains(_) => f.write_str("request.url"),
            Self::BodyHasKey(key) => write!(f, "request.body.{key}"),
            Self::BodyKeysExactly(_) => f.write_str("request.body.keys"),
            Self::BodyFieldEquals { key, .. } => write!(f, "request.body.{key}"),
            Self::StatusIs(_) => f.write_str("response.status"),
            Self::Equals(_) => f.write_str("equal"),
            Self::GreaterThan(_) => f.write_str("be.greaterThan"),
        }
    }
}

impl Predicate {
    /// Whether the predicate is about a count rather than one element
    #[must_use]
    pub const fn is_count(&self) -> bool {
        matches!(
            self,
            Self::CountEquals(_) | Self::CountGreaterThan(_) | Self::CountAtLeast(_)
        )
    }
}

fn check(ok: bool, predicate: &Predicate, expected: impl fmt::Display, actual: impl fmt::Display) -> LanecheckResult<()> {
    if ok {
        Ok(())
    } else {
        Err(LanecheckError::assertion(
            predicate.to_string(),
            expected.to_string(),
            actual.to_string(),
        ))
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Evaluate a predicate against a subject
pub fn evaluate(subject: &Subject, predicate: &Predicate) -> LanecheckResult<()> {
    use Predicate as P;
    use Subject as S;

    match (subject, predicate) {
        (S::Element(el), P::Visible) => check(el.visible, predicate, "visible", "hidden"),
        (S::Element(el), P::Hidden) => check(!el.visible, predicate, "hidden", "visible"),
        (S::Element(el), P::NotEmpty) => {
            check(!el.text.trim().is_empty(), predicate, "non-empty text", "\"\"")
        }
        (S::Element(el), P::TextContains(text)) => check(
            el.text.contains(text.as_str()),
            predicate,
            format!("{text:?}"),
            format!("{:?}", el.text),
        ),
        (S::Element(el), P::TextEquals(text)) => check(
            el.text.trim() == text.as_str(),
            predicate,
            format!("{text:?}"),
            format!("{:?}", el.text.trim()),
        ),
        (S::Element(el), P::HasAttribute(name)) => check(
            el.attributes.contains_key(name),
            predicate,
            "present",
            "absent",
        ),
        (S::Element(el), P::AttributeEquals { name, value }) => {
            let actual = el.attributes.get(name);
            check(
                actual == Some(value),
                predicate,
                format!("{value:?}"),
                actual.map_or_else(|| "absent".to_string(), |a| format!("{a:?}")),
            )
        }

        (S::Count(n), P::NotEmpty) => check(*n > 0, predicate, "> 0", n),
        (S::Count(n), P::CountEquals(expected)) => check(n == expected, predicate, expected, n),
        (S::Count(n), P::CountGreaterThan(min)) => {
            check(n > min, predicate, format!("> {min}"), n)
        }
        (S::Count(n), P::CountAtLeast(min)) => check(n >= min, predicate, format!(">= {min}"), n),
        (S::Count(n), P::Equals(value)) => check(
            value.as_u64() == Some(*n as u64),
            predicate,
            value,
            n,
        ),
        (S::Count(n), P::GreaterThan(min)) => {
            check(*n as f64 > *min, predicate, format!("> {min}"), n)
        }

        (S::Call(call), P::MethodIs(method)) => {
            check(call.method == *method, predicate, method, call.method)
        }
        (S::Call(call), P::UrlContains(part)) => check(
            call.url.contains(part.as_str()),
            predicate,
            format!("url containing {part:?}"),
            &call.url,
        ),
        (S::Call(call), P::BodyHasKey(key)) => check(
            call.body_field(key).is_some(),
            predicate,
            format!("key {key:?}"),
            format!("keys {:?}", call.body_keys()),
        ),
        (S::Call(call), P::BodyKeysExactly(keys)) => {
            let mut expected = keys.clone();
            expected.sort();
            let actual = call.body_keys();
            check(
                actual == expected,
                predicate,
                format!("{expected:?}"),
                format!("{actual:?}"),
            )
        }
        (S::Call(call), P::BodyFieldEquals { key, value }) => {
            let actual = call.body_field(key);
            check(
                actual == Some(value),
                predicate,
                value,
                actual.map_or_else(|| "absent".to_string(), ToString::to_string),
            )
        }
        (S::Call(call), P::StatusIs(status)) => {
            check(call.status == *status, predicate, status, call.status)
        }

        (S::Scalar(v), P::NotEmpty) => check(!is_empty_value(v), predicate, "non-empty", v),
        (S::Scalar(v), P::Equals(expected)) => check(v == expected, predicate, expected, v),
        (S::Scalar(v), P::GreaterThan(min)) => check(
            v.as_f64().is_some_and(|x| x > *min),
            predicate,
            format!("> {min}"),
            v,
        ),

        (subject, predicate) => Err(LanecheckError::assertion(
            predicate.to_string(),
            "a subject the predicate applies to",
            format!("{} subject", subject.kind()),
        )),
    }
}

/// Fluent wrapper over [`evaluate`]
#[derive(Debug, Clone)]
pub struct Expectation {
    subject: Subject,
}

/// Start an expectation
#[must_use]
pub fn expect(subject: impl Into<Subject>) -> Expectation {
    Expectation {
        subject: subject.into(),
    }
}

impl Expectation {
    /// The subject under test
    #[must_use]
    pub const fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Evaluate an arbitrary predicate
    pub fn to_satisfy(&self, predicate: &Predicate) -> LanecheckResult<&Self> {
        evaluate(&self.subject, predicate)?;
        Ok(self)
    }

    /// Element is visible
    pub fn to_be_visible(&self) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::Visible)
    }

    /// Element is hidden
    pub fn to_be_hidden(&self) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::Hidden)
    }

    /// Text, count, or value is non-empty
    pub fn not_to_be_empty(&self) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::NotEmpty)
    }

    /// Element text contains
    pub fn to_contain_text(&self, text: impl Into<String>) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::TextContains(text.into()))
    }

    /// Element text equals (trimmed)
    pub fn to_have_text(&self, text: impl Into<String>) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::TextEquals(text.into()))
    }

    /// Element attribute equals
    pub fn to_have_attribute(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::AttributeEquals {
            name: name.into(),
            value: value.into(),
        })
    }

    /// Count equals
    pub fn to_have_count(&self, count: usize) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::CountEquals(count))
    }

    /// Count is strictly greater
    pub fn to_have_count_greater_than(&self, count: usize) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::CountGreaterThan(count))
    }

    /// Call method equals
    pub fn to_have_method(&self, method: HttpMethod) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::MethodIs(method))
    }

    /// Call URL contains
    pub fn to_have_url_containing(&self, part: impl Into<String>) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::UrlContains(part.into()))
    }

    /// Call body has a key
    pub fn to_have_body_key(&self, key: impl Into<String>) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::BodyHasKey(key.into()))
    }

    /// Call body has exactly these keys
    pub fn to_have_body_keys(&self, keys: &[&str]) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::BodyKeysExactly(
            keys.iter().map(ToString::to_string).collect(),
        ))
    }

    /// Call body field equals
    pub fn to_have_body_field(&self, key: impl Into<String>, value: Value) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::BodyFieldEquals {
            key: key.into(),
            value,
        })
    }

    /// Call response status equals
    pub fn to_have_status(&self, status: u16) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::StatusIs(status))
    }

    /// Scalar equals
    pub fn to_equal(&self, value: Value) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::Equals(value))
    }

    /// Number is strictly greater
    pub fn to_be_greater_than(&self, min: f64) -> LanecheckResult<&Self> {
        self.to_satisfy(&Predicate::GreaterThan(min))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(text: &str, visible: bool) -> ElementState {
        let mut attributes = BTreeMap::new();
        attributes.insert("draggable".to_string(), "false".to_string());
        ElementState {
            tag: "div".to_string(),
            text: text.to_string(),
            visible,
            attributes,
        }
    }

    fn call() -> RecordedCall {
        RecordedCall {
            seq: 1,
            method: HttpMethod::Put,
            url: "http://localhost:3010/candidates/1".to_string(),
            body: Some(json!({ "applicationId": 101, "currentInterviewStep": 2 })),
            status: 200,
            stubbed: false,
        }
    }

    fn failure(result: LanecheckResult<()>) -> (String, String, String) {
        match result.unwrap_err() {
            LanecheckError::AssertionFailed {
                predicate,
                expected,
                actual,
            } => (predicate, expected, actual),
            other => panic!("unexpected error {other:?}"),
        }
    }

    mod element_tests {
        use super::*;

        #[test]
        fn test_visibility() {
            assert!(evaluate(&Subject::from(element("x", true)), &Predicate::Visible).is_ok());
            let (p, e, a) = failure(evaluate(&Subject::from(element("x", false)), &Predicate::Visible));
            assert_eq!((p.as_str(), e.as_str(), a.as_str()), ("be.visible", "visible", "hidden"));
        }

        #[test]
        fn test_not_empty_ignores_whitespace() {
            assert!(evaluate(&Subject::from(element("  ", true)), &Predicate::NotEmpty).is_err());
            assert!(evaluate(&Subject::from(element("Alice", true)), &Predicate::NotEmpty).is_ok());
        }

        #[test]
        fn test_text_and_attributes() {
            let subject: Subject = element(" Alice Johnson ", true).into();
            assert!(evaluate(&subject, &Predicate::TextContains("Alice".into())).is_ok());
            assert!(evaluate(&subject, &Predicate::TextEquals("Alice Johnson".into())).is_ok());
            assert!(evaluate(&subject, &Predicate::HasAttribute("draggable".into())).is_ok());
            let (_, _, actual) = failure(evaluate(
                &subject,
                &Predicate::AttributeEquals {
                    name: "draggable".into(),
                    value: "true".into(),
                },
            ));
            assert_eq!(actual, "\"false\"");
        }

        #[test]
        fn test_fluent_chain() {
            expect(element("Alice", true))
                .to_be_visible()
                .unwrap()
                .to_have_attribute("draggable", "false")
                .unwrap();
        }
    }

    mod count_tests {
        use super::*;

        #[test]
        fn test_counts() {
            assert!(expect(3_usize).to_have_count(3).is_ok());
            assert!(expect(3_usize).to_have_count_greater_than(0).is_ok());
            let (_, expected, actual) = failure(evaluate(&Subject::Count(2), &Predicate::CountEquals(3)));
            assert_eq!((expected.as_str(), actual.as_str()), ("3", "2"));
            assert!(evaluate(&Subject::Count(0), &Predicate::CountAtLeast(0)).is_ok());
            assert!(evaluate(&Subject::Count(0), &Predicate::NotEmpty).is_err());
        }

        #[test]
        fn test_is_count() {
            assert!(Predicate::CountAtLeast(1).is_count());
            assert!(!Predicate::Visible.is_count());
        }
    }

    mod call_tests {
        use super::*;

        #[test]
        fn test_update_call_shape() {
            expect(call())
                .to_have_method(HttpMethod::Put)
                .unwrap()
                .to_have_url_containing("/candidates/")
                .unwrap()
                .to_have_body_keys(&["currentInterviewStep", "applicationId"])
                .unwrap()
                .to_have_body_field("applicationId", json!(101))
                .unwrap()
                .to_have_status(200)
                .unwrap();
        }

        #[test]
        fn test_extra_body_key_fails_exact_keys() {
            let mut c = call();
            c.body = Some(json!({ "applicationId": 1, "currentInterviewStep": 2, "x": 3 }));
            assert!(expect(c).to_have_body_keys(&["applicationId", "currentInterviewStep"]).is_err());
        }

        #[test]
        fn test_missing_body() {
            let mut c = call();
            c.body = None;
            assert!(expect(c).to_have_body_key("applicationId").is_err());
        }
    }

    mod scalar_tests {
        use super::*;

        #[test]
        fn test_scalar_predicates() {
            assert!(expect(json!("x")).to_equal(json!("x")).is_ok());
            assert!(expect(json!(5)).to_be_greater_than(4.0).is_ok());
            assert!(expect(json!("5")).to_be_greater_than(4.0).is_err());
            assert!(expect(json!([])).not_to_be_empty().is_err());
        }

        #[test]
        fn test_kind_mismatch() {
            let (predicate, _, actual) = failure(evaluate(&Subject::Scalar(json!(1)), &Predicate::Visible));
            assert_eq!(predicate, "be.visible");
            assert_eq!(actual, "scalar subject");
        }
    }
}
