//! Constraint registry: externally supplied pins that narrow requirements.
//!
//! A constraint never introduces a package on its own. It only tightens the
//! specifier of a requirement that the resolution discovers anyway, or
//! supplies a direct URL for one that has neither version nor URL.

use std::collections::BTreeMap;

use wheelhouse_schema::{MarkerContext, PackageName, Requirement};

/// Validated constraints keyed by canonical name.
pub type Constraints = BTreeMap<PackageName, Requirement>;

/// Parse and validate raw constraint strings.
///
/// Returns the usable constraints and, for every input that was ignored or
/// merged into an earlier one, a message keyed by the raw text. Later
/// constraints on the same name are intersected with earlier ones.
pub fn validate_constraints<S: AsRef<str>>(
    raw: &[S],
    context: &MarkerContext,
) -> (Constraints, BTreeMap<String, String>) {
    let mut constraints = Constraints::new();
    let mut messages = BTreeMap::new();

    for text in raw {
        let text = text.as_ref();
        if text.trim().is_empty() {
            messages.insert(text.to_string(), "empty".to_string());
            continue;
        }
        let req = match Requirement::parse(text) {
            Ok(req) => req,
            Err(e) => {
                messages.insert(text.to_string(), format!("failed to parse: {e}"));
                continue;
            }
        };

        let mut problems = Vec::new();
        if !req.extras.is_empty() {
            problems.push("may not provide [extras]".to_string());
        }
        if req.url.is_none() && req.specifier.is_empty() {
            problems.push("no version or URL".to_string());
        }
        if let Some(marker) = &req.marker {
            match marker.evaluate(context) {
                Ok(true) => {}
                Ok(false) => problems.push(format!("not applicable: {marker}")),
                Err(e) => problems.push(format!("invalid marker: {e}")),
            }
        }
        if !problems.is_empty() {
            messages.insert(text.to_string(), problems.join("; "));
            continue;
        }

        if constraints.contains_key(&req.name) {
            messages.insert(
                text.to_string(),
                format!("updated existing constraint for {}", req.name),
            );
            let merged = constrain_requirement(&req, &constraints);
            constraints.insert(req.name.clone(), merged);
        } else {
            constraints.insert(req.name.clone(), req);
        }
    }

    (constraints, messages)
}

/// Narrow `req` with the matching constraint, if any.
///
/// A requirement that already names a URL is returned unchanged. A
/// constraint URL replaces the version specifier; otherwise the
/// constraint's clauses are added to the requirement's. Extras and the
/// marker always come from `req`.
pub fn constrain_requirement(req: &Requirement, constraints: &Constraints) -> Requirement {
    if req.url.is_some() {
        return req.clone();
    }
    let Some(constraint) = constraints.get(&req.name) else {
        return req.clone();
    };

    let mut narrowed = req.clone();
    if let Some(url) = &constraint.url {
        narrowed.url = Some(url.clone());
        *narrowed.specifier_mut() = constraint.specifier.clone();
    } else {
        narrowed.specifier_mut().extend(&constraint.specifier);
    }
    narrowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelhouse_schema::{MarkerEnvironment, Version};

    fn context() -> MarkerContext {
        MarkerEnvironment::default().to_context(None)
    }

    #[test]
    fn test_valid_constraints_have_no_messages() {
        for raw in [
            "pytest==7.2.2",
            "pytest>=7.2.1,<8",
            "pytest @ https://files.example/pytest-7.2.2-py3-none-any.whl",
            "https://files.example/pytest-7.2.2-py3-none-any.whl",
        ] {
            let (constraints, messages) = validate_constraints(&[raw], &context());
            assert_eq!(constraints.len(), 1, "{raw}");
            assert!(messages.is_empty(), "{raw}: {messages:?}");
        }
    }

    #[test]
    fn test_later_constraints_merge() {
        let raw = [
            "pytest==7.2.2",
            "pytest>=7.2.2",
            "pytest>=7.2.2 ; python_version>'2.7'",
            "pytest>=7.2.2 ; python_version<'3'",
        ];
        let (constraints, messages) = validate_constraints(&raw, &context());
        assert_eq!(constraints.len(), 1);
        assert!(messages[raw[1]].contains("updated existing"));
        assert!(messages[raw[2]].contains("updated existing"));
        assert!(messages[raw[3]].contains("not applicable"));
        assert!(!messages.contains_key(raw[0]));

        let merged = &constraints["pytest"];
        assert_eq!(merged.specifier.len(), 2);
    }

    #[test]
    fn test_invalid_constraints() {
        let cases = [
            ("", "empty"),
            ("==", "failed to parse"),
            ("pytest", "no version or URL"),
            ("pytest[extra]==1.0", "may not provide [extras]"),
        ];
        for (raw, expected) in cases {
            let (constraints, messages) = validate_constraints(&[raw], &context());
            assert!(constraints.is_empty(), "{raw}");
            assert!(messages[raw].contains(expected), "{raw}: {}", messages[raw]);
        }
    }

    #[test]
    fn test_constrain_bare_requirement() {
        let req = Requirement::new("pytest");
        let (constraints, _) = validate_constraints(&["pytest<8"], &context());
        let narrowed = constrain_requirement(&req, &constraints);
        assert!(!narrowed.specifier.is_empty());
        assert!(narrowed.url.is_none());

        let (constraints, _) = validate_constraints(
            &["pytest @ https://files.example/pytest-7.2.2-py3-none-any.whl"],
            &context(),
        );
        let narrowed = constrain_requirement(&req, &constraints);
        assert!(narrowed.specifier.is_empty());
        assert!(narrowed.url.is_some());
    }

    #[test]
    fn test_constraint_only_narrows() {
        let req = Requirement::parse("pytest[testing]>=7").unwrap();
        let (constraints, _) = validate_constraints(&["pytest<7.3"], &context());
        let narrowed = constrain_requirement(&req, &constraints);
        assert_eq!(narrowed.extras, req.extras);
        assert!(narrowed.specifier.contains(&Version::parse("7.2.0").unwrap(), None));
        assert!(!narrowed.specifier.contains(&Version::parse("7.4.0").unwrap(), None));
        assert!(!narrowed.specifier.contains(&Version::parse("6.0").unwrap(), None));

        let unrelated = Requirement::new("attrs");
        assert_eq!(constrain_requirement(&unrelated, &constraints), unrelated);
    }

    #[test]
    fn test_explicit_url_is_kept() {
        let req =
            Requirement::parse("pytest @ https://mine.example/pytest-7.0-py3-none-any.whl").unwrap();
        let (constraints, _) = validate_constraints(
            &["pytest @ https://files.example/pytest-7.2.2-py3-none-any.whl"],
            &context(),
        );
        assert_eq!(constrain_requirement(&req, &constraints), req);
    }
}
