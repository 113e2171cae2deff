// src/reader/naming.rs

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::error::{DuplicateName, FmpError, FmpResult};
use crate::schema::FieldDefinition;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("valid regex"));
static LEADING_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d").expect("valid regex"));

/// Lower-case, trim, collapse every run of non-word characters into `_`, and
/// prefix `_` when the result would start with a digit.
///
/// `"2nd Name"` becomes `"_2nd_name"`, `"Aantal bedr."` becomes `"aantal_bedr_"`.
pub fn sanitize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, "_");
    if LEADING_DIGIT.is_match(&cleaned) {
        format!("_{}", cleaned)
    } else {
        cleaned.into_owned()
    }
}

/// Strategy turning the header's field list into one output name per field.
///
/// Implementations return exactly one name per definition, in the same order.
/// The reader checks length and uniqueness afterwards, whatever the strategy.
pub trait NameResolver {
    fn resolve(&self, fields: &[FieldDefinition]) -> FmpResult<Vec<String>>;
}

impl<F> NameResolver for F
where
    F: Fn(&[FieldDefinition]) -> FmpResult<Vec<String>>,
{
    fn resolve(&self, fields: &[FieldDefinition]) -> FmpResult<Vec<String>> {
        self(fields)
    }
}

/// Sanitizes every name and refuses collisions, rather than silently merging
/// distinct source columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNameResolver;

impl NameResolver for DefaultNameResolver {
    fn resolve(&self, fields: &[FieldDefinition]) -> FmpResult<Vec<String>> {
        let names: Vec<String> = fields.iter().map(|f| sanitize_name(&f.name)).collect();
        check_unique(fields, &names)?;
        Ok(names)
    }
}

/// Sanitizes every name and appends `_2`, `_3`, ... to later collisions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberedNameResolver;

impl NameResolver for NumberedNameResolver {
    fn resolve(&self, fields: &[FieldDefinition]) -> FmpResult<Vec<String>> {
        let base: Vec<String> = fields.iter().map(|f| sanitize_name(&f.name)).collect();
        let mut taken: HashSet<String> = base.iter().cloned().collect();
        let mut seen: HashSet<&str> = HashSet::with_capacity(base.len());
        let mut counters: HashMap<&str, usize> = HashMap::new();
        let mut names = Vec::with_capacity(base.len());

        for name in &base {
            if seen.insert(name.as_str()) {
                names.push(name.clone());
                continue;
            }
            let counter = counters.entry(name.as_str()).or_insert(1);
            let renamed = loop {
                *counter += 1;
                let candidate = format!("{}_{}", name, counter);
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };
            taken.insert(renamed.clone());
            names.push(renamed);
        }
        Ok(names)
    }
}

/// Fail with every sanitized name claimed by more than one field.
pub fn check_unique(fields: &[FieldDefinition], names: &[String]) -> FmpResult<()> {
    let mut by_name: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (field, name) in fields.iter().zip(names) {
        by_name
            .entry(name.as_str())
            .or_default()
            .push(field.name.clone());
    }
    let duplicates: Vec<DuplicateName> = by_name
        .into_iter()
        .filter(|(_, originals)| originals.len() > 1)
        .map(|(name, original_names)| DuplicateName {
            sanitized_name: name.to_string(),
            original_names,
        })
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(FmpError::DuplicateNames { duplicates })
    }
}
