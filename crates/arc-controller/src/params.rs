//! Workflow parameter construction.
//!
//! A resolved job becomes a flat list of string parameters:
//!
//! 1. The well-known parameters `srcType`, `srcRemoteURL`, `dstType`,
//!    `dstRemoteURL`, `srcSecret`, `dstSecret`, in that order.
//! 2. The artifact payload, flattened in lexicographic key order.
//!
//! Flattened names concatenate the path, upper-casing the first letter of
//! every segment after the first (`note.level` becomes `noteLevel`). List
//! elements append their zero-based index (`tags[0]` becomes `tags0`).
//!
//! Empty keys are rejected at any depth. Flattening keeps colliding names.
//! [`validate_no_duplicate_parameters`] rejects them once the artifact
//! type's parameters have been appended.

use std::collections::BTreeSet;

use crate::api::Parameter;
use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::resolver::ResolvedJob;

/// Builds the parameter list for a resolved job.
///
/// # Errors
///
/// Returns `Error::Serialization` if the payload is not a key/value document.
pub fn job_parameters(job: &ResolvedJob) -> Result<Vec<Parameter>> {
    let src = &job.src.endpoint.spec;
    let dst = &job.dst.endpoint.spec;

    let mut params = vec![
        Parameter::new(param_name("src", "type"), src.type_name.clone()),
        Parameter::new(param_name("src", "remoteURL"), src.remote_url.clone()),
        Parameter::new(param_name("dst", "type"), dst.type_name.clone()),
        Parameter::new(param_name("dst", "remoteURL"), dst.remote_url.clone()),
        Parameter::new("srcSecret", (!src.secret_ref.is_empty()).to_string()),
        Parameter::new("dstSecret", (!dst.secret_ref.is_empty()).to_string()),
    ];
    params.extend(flatten(&job.artifact.payload)?);
    Ok(params)
}

/// Flattens a payload document into ordered parameters.
///
/// # Errors
///
/// Returns `Error::Serialization` if the top level is a scalar or a list,
/// or if any map key is empty.
pub fn flatten(payload: &Payload) -> Result<Vec<Parameter>> {
    let mut out = Vec::new();
    for (key, value) in payload.entries()? {
        reject_empty_key(key, "")?;
        flatten_value(key.clone(), value, &mut out)?;
    }
    Ok(out)
}

fn flatten_value(name: String, value: &Payload, out: &mut Vec<Parameter>) -> Result<()> {
    match value {
        Payload::Scalar(scalar) => out.push(Parameter::new(name, scalar.to_string())),
        Payload::Map(map) => {
            for (key, child) in map {
                reject_empty_key(key, &name)?;
                flatten_value(param_name(&name, key), child, out)?;
            }
        }
        Payload::List(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_value(format!("{name}{index}"), item, out)?;
            }
        }
    }
    Ok(())
}

fn reject_empty_key(key: &str, parent: &str) -> Result<()> {
    if !key.is_empty() {
        return Ok(());
    }
    if parent.is_empty() {
        Err(Error::serialization("payload contains an empty key"))
    } else {
        Err(Error::serialization(format!(
            "payload contains an empty key under '{parent}'"
        )))
    }
}

/// Joins a prefix and a key, upper-casing the key's first letter.
///
/// An empty prefix leaves the key unchanged.
#[must_use]
pub fn param_name(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        return key.to_string();
    }
    let mut chars = key.chars();
    let mut name = String::with_capacity(prefix.len() + key.len());
    name.push_str(prefix);
    if let Some(first) = chars.next() {
        name.extend(first.to_uppercase());
        name.push_str(chars.as_str());
    }
    name
}

/// Rejects a parameter list in which a name appears twice.
///
/// Names are compared case-sensitively.
///
/// # Errors
///
/// Returns `Error::Validation` naming the first repeated parameter.
pub fn validate_no_duplicate_parameters<'a>(
    params: impl IntoIterator<Item = &'a Parameter>,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for param in params {
        if !seen.insert(param.name.as_str()) {
            return Err(Error::validation(format!(
                "duplicate parameter name found: {}",
                param.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::api::{Endpoint, EndpointSpec, LocalObjectReference, OrderArtifact, Secret};
    use crate::resolver::ResolvedEndpoint;

    fn names(params: &[Parameter]) -> Vec<&str> {
        params.iter().map(|p| p.name.as_str()).collect()
    }

    fn flat(value: serde_json::Value) -> Vec<Parameter> {
        flatten(&Payload::from(value)).unwrap_or_else(|e| panic!("flatten: {e}"))
    }

    #[test]
    fn nested_keys_are_camel_cased() {
        let params = flat(json!({"note": {"level": "high"}}));
        assert_eq!(params, vec![Parameter::new("noteLevel", "high")]);
    }

    #[test]
    fn lists_append_indexes() {
        let params = flat(json!({"tags": ["1.25", "latest"], "deep": [{"name": "a"}, [true]]}));
        assert_eq!(names(&params), vec!["deep0Name", "deep10", "tags0", "tags1"]);
        assert_eq!(params[1].value, "true");
        assert_eq!(params[3].value, "latest");
    }

    #[test]
    fn scalars_are_stringified() {
        let params = flat(json!({"count": 3, "ratio": 0.5, "insecure": false, "none": null}));
        let values: BTreeMap<_, _> = params
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect();
        assert_eq!(values["count"], "3");
        assert_eq!(values["ratio"], "0.5");
        assert_eq!(values["insecure"], "false");
        assert_eq!(values["none"], "");
    }

    #[test]
    fn non_document_payloads_fail() {
        assert!(matches!(
            flatten(&Payload::from(json!(["a"]))),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn empty_keys_are_rejected() {
        for payload in [
            json!({"": "x"}),
            json!({"": {"level": 1}}),
            json!({"note": {"": "high"}}),
            json!({"tags": [{"": true}]}),
        ] {
            let result = flatten(&Payload::from(payload.clone()));
            assert!(
                matches!(result, Err(Error::Serialization { .. })),
                "{payload} should be rejected, got {result:?}"
            );
        }

        let err = flatten(&Payload::from(json!({"note": {"": "high"}})))
            .err()
            .unwrap_or_else(|| panic!("expected an error"));
        assert!(err.to_string().contains("under 'note'"));
    }

    #[test]
    fn well_known_parameters_come_first() {
        let endpoint = |name: &str, secret: bool| ResolvedEndpoint {
            endpoint: Endpoint::new(
                "ns",
                name,
                EndpointSpec {
                    type_name: "oci".into(),
                    remote_url: format!("https://{name}"),
                    secret_ref: if secret {
                        LocalObjectReference::new("creds")
                    } else {
                        LocalObjectReference::default()
                    },
                    ..EndpointSpec::default()
                },
            ),
            secret: secret.then(|| Secret::new("ns", "creds", BTreeMap::new())),
        };
        let mut artifact = OrderArtifact::new("oci");
        artifact.payload = Payload::from(json!({"image": "nginx"}));
        let job = ResolvedJob {
            artifact_index: 0,
            artifact,
            src: endpoint("hub", true),
            dst: endpoint("internal", false),
        };

        let params = job_parameters(&job).unwrap_or_else(|e| panic!("params: {e}"));
        assert_eq!(
            names(&params),
            vec![
                "srcType",
                "srcRemoteURL",
                "dstType",
                "dstRemoteURL",
                "srcSecret",
                "dstSecret",
                "image"
            ]
        );
        assert_eq!(params[1].value, "https://hub");
        assert_eq!(params[4].value, "true");
        assert_eq!(params[5].value, "false");
    }

    #[test]
    fn duplicates_are_rejected_by_name() {
        let params = vec![
            Parameter::new("srcType", "oci"),
            Parameter::new("image", "nginx"),
            Parameter::new("srcType", "helm"),
        ];
        let err = validate_no_duplicate_parameters(&params)
            .err()
            .unwrap_or_else(|| panic!("expected a duplicate"));
        assert_eq!(
            err.to_string(),
            "duplicate parameter name found: srcType"
        );

        let case_differs = vec![Parameter::new("tag", "a"), Parameter::new("Tag", "b")];
        assert!(validate_no_duplicate_parameters(&case_differs).is_ok());
    }

    #[test]
    fn flattening_keeps_collisions_for_validation() {
        let params = flat(json!({"note": {"level": "high"}, "noteLevel": "low"}));
        assert_eq!(names(&params), vec!["noteLevel", "noteLevel"]);
        assert!(validate_no_duplicate_parameters(&params).is_err());
    }

    proptest! {
        #[test]
        fn flat_documents_keep_keys_in_order(
            entries in prop::collection::btree_map("[a-z]{1,6}", "[a-zA-Z0-9]{0,6}", 0..8),
        ) {
            let value = serde_json::to_value(&entries).unwrap_or_else(|e| panic!("{e}"));
            let params = flat(value);
            let expected: Vec<Parameter> = entries
                .iter()
                .map(|(k, v)| Parameter::new(k.clone(), v.clone()))
                .collect();
            prop_assert_eq!(params, expected);
        }
    }
}
