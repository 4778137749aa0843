// Copyright 2024 Oxide Computer Company

//! Compiling path templates into patterns that extract path parameters
//!
//! An operation's path template names its path parameters in braces:
//!
//! ```text
//! /subscriptions/{subscriptionId}/api-version/{api-version}/resources/{resourceId}
//! ```
//!
//! Each placeholder is bound in one of two ways, recorded explicitly as a
//! [`PathSegment`]:
//!
//! * [`PathSegment::Literal`]: the parameter has a constant value known when
//!   the fake is built (a pinned API version, for example).  The value is
//!   substituted into the pattern as plain text and produces no capture
//!   group, so a request for any other value does not match at all.
//! * [`PathSegment::Variable`]: the parameter is captured from the request
//!   path with a named group.  Writing `{name?}` makes the group optional.
//!
//! The compiled [`PathPattern`] checks that its regular expression has
//! exactly one named group per variable and no other groups.  A pattern that
//! would bind parameters to the wrong groups therefore fails to compile
//! instead of silently shifting every value after the first extra group.

use percent_encoding::percent_decode_str;
use percent_encoding::utf8_percent_encode;
use percent_encoding::AsciiSet;
use percent_encoding::CONTROLS;
use regex::Regex;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

/// Characters a captured path parameter may contain, in its escaped form.
pub const SEGMENT_CHARS: &str = r"[!#&$-;=?-\[\]_a-zA-Z0-9~%@]+";

/// Characters escaped when a literal value is substituted into a path.
const PATH_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Values of the variables captured from a request path, keyed by parameter
/// name, already percent-decoded.
pub type VariableSet = BTreeMap<String, String>;

/// One piece of a parsed path template.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathSegment {
    /// Fixed text from the template between placeholders.
    Text(String),
    /// A placeholder whose value is a constant known when the fake is built.
    Literal { name: String, value: String },
    /// A placeholder whose value is captured from the request path.
    Variable { name: String, optional: bool },
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PathPatternError {
    #[error("path template \"{0}\" has an unterminated placeholder")]
    UnterminatedPlaceholder(String),
    #[error("path template \"{0}\" has an unmatched '}}'")]
    UnmatchedBrace(String),
    #[error("path template \"{0}\" has an empty placeholder")]
    EmptyPlaceholder(String),
    #[error("path parameter \"{0}\" appears more than once")]
    DuplicateVariable(String),
    #[error("literal value given for \"{0}\", which is not in the template")]
    UnknownLiteral(String),
    #[error("pattern \"{0}\" has a capture group without a name")]
    UnnamedGroup(String),
    #[error("pattern has {found} capture groups, expected {expected}")]
    CaptureMismatch { expected: usize, found: usize },
    #[error("invalid pattern: {0}")]
    Regex(String),
}

/// Why a request path failed to yield variables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathMatchError {
    NoMatch,
    Decode { name: String, message: String },
}

/// Splits `template` into text and placeholders, binding each placeholder
/// named in `literals` to its constant value and every other placeholder to
/// a variable.
pub fn parse_template(
    template: &str,
    literals: &BTreeMap<String, String>,
) -> Result<Vec<PathSegment>, PathPatternError> {
    let mut segments = Vec::new();
    let mut seen = BTreeSet::new();
    let mut rest = template;

    while !rest.is_empty() {
        let open = rest.find('{');
        let close = rest.find('}');
        match (open, close) {
            (None, None) => {
                segments.push(PathSegment::Text(rest.to_string()));
                break;
            }
            (None, Some(_)) => {
                return Err(PathPatternError::UnmatchedBrace(
                    template.to_string(),
                ));
            }
            (Some(o), Some(c)) if c < o => {
                return Err(PathPatternError::UnmatchedBrace(
                    template.to_string(),
                ));
            }
            (Some(_), None) => {
                return Err(PathPatternError::UnterminatedPlaceholder(
                    template.to_string(),
                ));
            }
            (Some(o), Some(c)) => {
                if o > 0 {
                    segments.push(PathSegment::Text(rest[..o].to_string()));
                }
                let inner = &rest[o + 1..c];
                if inner.contains('{') {
                    return Err(PathPatternError::UnterminatedPlaceholder(
                        template.to_string(),
                    ));
                }
                let (name, optional) = match inner.strip_suffix('?') {
                    Some(name) => (name, true),
                    None => (inner, false),
                };
                if name.is_empty() {
                    return Err(PathPatternError::EmptyPlaceholder(
                        template.to_string(),
                    ));
                }
                if !seen.insert(name.to_string()) {
                    return Err(PathPatternError::DuplicateVariable(
                        name.to_string(),
                    ));
                }
                segments.push(match literals.get(name) {
                    Some(value) => PathSegment::Literal {
                        name: name.to_string(),
                        value: value.clone(),
                    },
                    None => PathSegment::Variable {
                        name: name.to_string(),
                        optional,
                    },
                });
                rest = &rest[c + 1..];
            }
        }
    }

    if let Some(unknown) = literals.keys().find(|name| !seen.contains(*name)) {
        return Err(PathPatternError::UnknownLiteral(unknown.clone()));
    }

    Ok(segments)
}

/// Returns a regex group name for a path parameter name.
fn group_name(name: &str) -> String {
    let mut group: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if group.starts_with(|c: char| c.is_ascii_digit()) {
        group.insert(0, '_');
    }
    group
}

#[derive(Clone, Debug)]
struct PatternVariable {
    /** parameter name, as written in the template */
    name: String,
    /** name of the capture group */
    group: String,
}

/// A compiled path pattern.
#[derive(Clone)]
pub struct PathPattern {
    regex: Regex,
    variables: Vec<PatternVariable>,
}

impl PathPattern {
    /// Compiles `template`, treating the placeholders named in `literals` as
    /// constants and every other placeholder as a variable.
    pub fn new(
        template: &str,
        literals: &[(&str, &str)],
    ) -> Result<PathPattern, PathPatternError> {
        let literals = literals
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        PathPattern::from_segments(&parse_template(template, &literals)?)
    }

    /// Compiles a sequence of segments.  The pattern matches a path that
    /// ends with the segments, so requests may carry a base path prefix.
    pub fn from_segments(
        segments: &[PathSegment],
    ) -> Result<PathPattern, PathPatternError> {
        let mut source = String::new();
        let mut variables: Vec<PatternVariable> = Vec::new();

        for segment in segments {
            match segment {
                PathSegment::Text(text) => {
                    source.push_str(&regex::escape(text));
                }
                PathSegment::Literal { value, .. } => {
                    let encoded =
                        utf8_percent_encode(value, PATH_VALUE).to_string();
                    source.push_str(&regex::escape(&encoded));
                }
                PathSegment::Variable { name, optional } => {
                    let group = group_name(name);
                    if variables.iter().any(|v| v.group == group) {
                        return Err(PathPatternError::DuplicateVariable(
                            name.clone(),
                        ));
                    }
                    source.push_str(&format!(
                        "(?P<{}>{}){}",
                        group,
                        SEGMENT_CHARS,
                        if *optional { "?" } else { "" }
                    ));
                    variables
                        .push(PatternVariable { name: name.clone(), group });
                }
            }
        }
        source.push('$');

        let regex = Regex::new(&source)
            .map_err(|e| PathPatternError::Regex(e.to_string()))?;
        PathPattern::checked(regex, variables)
    }

    /// Wraps a hand-written regular expression.  Every capture group must be
    /// named; each name becomes a variable.
    pub fn from_regex(source: &str) -> Result<PathPattern, PathPatternError> {
        let regex = Regex::new(source)
            .map_err(|e| PathPatternError::Regex(e.to_string()))?;
        let mut variables = Vec::new();
        for name in regex.capture_names().skip(1) {
            match name {
                Some(name) => variables.push(PatternVariable {
                    name: name.to_string(),
                    group: name.to_string(),
                }),
                None => {
                    return Err(PathPatternError::UnnamedGroup(
                        source.to_string(),
                    ));
                }
            }
        }
        PathPattern::checked(regex, variables)
    }

    fn checked(
        regex: Regex,
        variables: Vec<PatternVariable>,
    ) -> Result<PathPattern, PathPatternError> {
        let found = regex.captures_len() - 1;
        if found != variables.len() {
            return Err(PathPatternError::CaptureMismatch {
                expected: variables.len(),
                found,
            });
        }
        let groups_agree = regex
            .capture_names()
            .skip(1)
            .zip(variables.iter())
            .all(|(name, variable)| name == Some(variable.group.as_str()));
        if !groups_agree {
            return Err(PathPatternError::CaptureMismatch {
                expected: variables.len(),
                found,
            });
        }
        Ok(PathPattern { regex, variables })
    }

    /// Returns the regular expression source.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Returns the capture group names, in order.
    pub fn capture_names(&self) -> Vec<&str> {
        self.regex.capture_names().flatten().collect()
    }

    /// Returns the names of the variable parameters, in order.
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    /// Matches an escaped request path, returning the percent-decoded value
    /// of each variable that participated in the match.
    pub fn match_path(&self, path: &str) -> Result<VariableSet, PathMatchError> {
        let captures =
            self.regex.captures(path).ok_or(PathMatchError::NoMatch)?;
        let mut values = VariableSet::new();
        for variable in &self.variables {
            let Some(matched) = captures.name(&variable.group) else {
                continue;
            };
            let value = percent_decode_str(matched.as_str())
                .decode_utf8()
                .map_err(|e| PathMatchError::Decode {
                    name: variable.name.clone(),
                    message: e.to_string(),
                })?;
            values.insert(variable.name.clone(), value.into_owned());
        }
        Ok(values)
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathPattern")
            .field("regex", &self.regex.as_str())
            .field("variables", &self.variable_names())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::parse_template;
    use super::PathMatchError;
    use super::PathPattern;
    use super::PathPatternError;
    use super::PathSegment;
    use super::SEGMENT_CHARS;
    use std::collections::BTreeMap;

    fn literal(name: &str, value: &str) -> BTreeMap<String, String> {
        [(name.to_string(), value.to_string())].into_iter().collect()
    }

    #[test]
    fn test_parse_template() {
        let segments = parse_template(
            "/api/{api-version}/things/{name}/{rest?}",
            &literal("api-version", "2023-01-01"),
        )
        .unwrap();
        assert_eq!(segments, vec![
            PathSegment::Text("/api/".to_string()),
            PathSegment::Literal {
                name: "api-version".to_string(),
                value: "2023-01-01".to_string(),
            },
            PathSegment::Text("/things/".to_string()),
            PathSegment::Variable { name: "name".to_string(), optional: false },
            PathSegment::Text("/".to_string()),
            PathSegment::Variable { name: "rest".to_string(), optional: true },
        ]);
    }

    #[test]
    fn test_parse_template_errors() {
        let none = BTreeMap::new();
        assert_eq!(
            parse_template("/a/{b", &none).unwrap_err(),
            PathPatternError::UnterminatedPlaceholder("/a/{b".to_string())
        );
        assert_eq!(
            parse_template("/a/b}", &none).unwrap_err(),
            PathPatternError::UnmatchedBrace("/a/b}".to_string())
        );
        assert_eq!(
            parse_template("/a/{}", &none).unwrap_err(),
            PathPatternError::EmptyPlaceholder("/a/{}".to_string())
        );
        assert_eq!(
            parse_template("/a/{b{c}}", &none).unwrap_err(),
            PathPatternError::UnterminatedPlaceholder("/a/{b{c}}".to_string())
        );
        assert_eq!(
            parse_template("/{a}/{a}", &none).unwrap_err(),
            PathPatternError::DuplicateVariable("a".to_string())
        );
        assert_eq!(
            parse_template("/{a}", &literal("b", "1")).unwrap_err(),
            PathPatternError::UnknownLiteral("b".to_string())
        );
    }

    #[test]
    fn test_literal_api_version() {
        let pattern = PathPattern::new(
            "/subscriptions/{subscriptionId}/api-version/{api-version}\
             /resources/{resourceId}",
            &[("api-version", "2023-01-01")],
        )
        .unwrap();
        assert_eq!(pattern.capture_names(), vec![
            "subscriptionId",
            "resourceId"
        ]);

        let values = pattern
            .match_path(
                "/subscriptions/test-sub/api-version/2023-01-01\
                 /resources/test-res",
            )
            .unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["subscriptionId"], "test-sub");
        assert_eq!(values["resourceId"], "test-res");

        assert_eq!(
            pattern
                .match_path(
                    "/subscriptions/test-sub/api-version/2024-01-01\
                     /resources/test-res",
                )
                .unwrap_err(),
            PathMatchError::NoMatch
        );
    }

    #[test]
    fn test_hand_written_pattern() {
        let source = format!(
            "/subscriptions/(?P<subscriptionId>{0})/api-version/2023-01-01\
             /resources/(?P<resourceId>{0})",
            SEGMENT_CHARS
        );
        let pattern = PathPattern::from_regex(&source).unwrap();
        assert_eq!(pattern.capture_names().len(), 2);
        let values = pattern
            .match_path(
                "/subscriptions/test-sub/api-version/2023-01-01\
                 /resources/test-res",
            )
            .unwrap();
        assert_eq!(values["subscriptionId"], "test-sub");
        assert_eq!(values["resourceId"], "test-res");
        assert!(pattern
            .match_path(
                "/subscriptions/test-sub/api-version/2024-01-01\
                 /resources/test-res"
            )
            .is_err());

        let unnamed = format!("/things/({})", SEGMENT_CHARS);
        assert!(matches!(
            PathPattern::from_regex(&unnamed),
            Err(PathPatternError::UnnamedGroup(_))
        ));
    }

    #[test]
    fn test_variable_api_version() {
        // When the API version is an ordinary parameter it gets a group like
        // any other, with a sanitized group name.
        let pattern = PathPattern::new(
            "/api/{api-version}/subscriptions/{subscriptionId}",
            &[],
        )
        .unwrap();
        assert_eq!(pattern.capture_names(), vec![
            "api_version",
            "subscriptionId"
        ]);
        assert_eq!(pattern.variable_names(), vec![
            "api-version",
            "subscriptionId"
        ]);
        let values = pattern
            .match_path("/api/2023-01-01/subscriptions/test-subscription")
            .unwrap();
        assert_eq!(values["api-version"], "2023-01-01");
        assert_eq!(values["subscriptionId"], "test-subscription");

        let pattern = PathPattern::new(
            "/api/{api-version}/versions/{version}/subscriptions\
             /{subscriptionId}",
            &[("api-version", "2023-01-01")],
        )
        .unwrap();
        assert_eq!(pattern.capture_names(), vec!["version", "subscriptionId"]);
    }

    #[test]
    fn test_mixed_literal_and_variables() {
        let pattern = PathPattern::new(
            "/providers/Microsoft.Storage/storageAccounts/{accountName}\
             /api-version/{api-version}/blobServices/{blobServiceName}",
            &[("api-version", "2023-01-01")],
        )
        .unwrap();
        let values = pattern
            .match_path(
                "/providers/Microsoft.Storage/storageAccounts\
                 /mystorageaccount/api-version/2023-01-01/blobServices\
                 /default",
            )
            .unwrap();
        assert_eq!(values["accountName"], "mystorageaccount");
        assert_eq!(values["blobServiceName"], "default");

        // The '.' in the provider name is literal text, not a wildcard.
        assert!(pattern
            .match_path(
                "/providers/MicrosoftXStorage/storageAccounts/acct\
                 /api-version/2023-01-01/blobServices/default"
            )
            .is_err());
    }

    #[test]
    fn test_percent_decoding() {
        let pattern =
            PathPattern::new("/widgets/{name}/parts/{part}", &[]).unwrap();
        let values = pattern
            .match_path("/widgets/big%20widget/parts/a%2Fb")
            .unwrap();
        assert_eq!(values["name"], "big widget");
        assert_eq!(values["part"], "a/b");

        assert!(matches!(
            pattern.match_path("/widgets/%FF/parts/x"),
            Err(PathMatchError::Decode { name, .. }) if name == "name"
        ));
    }

    #[test]
    fn test_optional_variable() {
        let pattern = PathPattern::new("/widgets/{name?}", &[]).unwrap();
        assert_eq!(pattern.match_path("/widgets/w1").unwrap()["name"], "w1");
        assert!(pattern.match_path("/widgets/").unwrap().is_empty());
    }

    #[test]
    fn test_base_path_prefix() {
        let pattern = PathPattern::new("/widgets/{name}", &[]).unwrap();
        let values = pattern.match_path("/service/v1/widgets/w1").unwrap();
        assert_eq!(values["name"], "w1");
        assert_eq!(
            PathPattern::new("/widgets/{name}/parts", &[])
                .unwrap()
                .match_path("/widgets/w1/parts/more")
                .unwrap_err(),
            PathMatchError::NoMatch
        );
    }

    #[test]
    fn test_sanitized_group_collision() {
        assert_eq!(
            PathPattern::new("/{a-b}/{a_b}", &[]).unwrap_err(),
            PathPatternError::DuplicateVariable("a_b".to_string())
        );
    }

    #[test]
    fn test_literal_values_are_escaped() {
        let pattern =
            PathPattern::new("/things/{kind}/{id}", &[("kind", "a b")])
                .unwrap();
        assert_eq!(pattern.capture_names(), vec!["id"]);
        assert!(pattern.match_path("/things/a%20b/1").is_ok());
        assert!(pattern.match_path("/things/aXb/1").is_err());
    }
}
