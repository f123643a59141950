//! Reference resolution and extraction.
//!
//! Formulas keep reference tokens as typed (`A1`, `A1:C3`, `Revenue`). This
//! module turns them into concrete `CellAddress`es, for evaluation and for
//! dependency graph construction. A token that names a defined range always
//! resolves to that range, even when it is also a valid A1 address.

use rustc_hash::FxHashSet;

use crate::address::{parse_address, parse_range, range_cell_count, resolve_range, CellAddress, SheetId};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::named_range::NamedRangeStore;

use super::parser::{parse, FormulaCall, ParseOutcome};

/// Cells covered by a named range (case-insensitive), or `None` if undefined.
pub fn resolve_named_range(name: &str, names: &NamedRangeStore) -> Option<Vec<CellAddress>> {
    names.get(name).map(|range| range.cells())
}

/// Resolve one reference token for a formula on `sheet`.
///
/// Named ranges are tried first, then a literal range, then a single address.
pub fn resolve_token(token: &str, sheet: SheetId, names: &NamedRangeStore) -> Option<Vec<CellAddress>> {
    if let Some(cells) = resolve_named_range(token, names) {
        return Some(cells);
    }
    if let Some((a, b)) = parse_range(token) {
        let a = CellAddress::new(sheet, a.0, a.1);
        let b = CellAddress::new(sheet, b.0, b.1);
        return Some(resolve_range(a, b));
    }
    parse_address(token).map(|(col, row)| vec![CellAddress::new(sheet, col, row)])
}

/// Every cell a parsed call depends on: deduplicated and sorted.
///
/// # Errors
///
/// - `RangeTooLarge` when a literal range or named range covers more than
///   `config.max_range_cells` cells (checked before expanding).
/// - `UnresolvedReference` for a token that is neither a defined name nor an
///   address, unless `config.reject_unresolved_names` is off, in which case
///   the token contributes no dependencies.
pub fn extract_references(
    call: &FormulaCall,
    sheet: SheetId,
    names: &NamedRangeStore,
    config: &EngineConfig,
) -> Result<Vec<CellAddress>, EngineError> {
    let mut refs = FxHashSet::default();

    for token in call.references() {
        if let Some(range) = names.get(token) {
            check_size(token, range.rect.cell_count(), config)?;
            refs.extend(range.cells());
        } else if let Some((a, b)) = parse_range(token) {
            check_size(token, range_cell_count(a, b).unwrap_or(usize::MAX), config)?;
            refs.extend(resolve_range(
                CellAddress::new(sheet, a.0, a.1),
                CellAddress::new(sheet, b.0, b.1),
            ));
        } else if let Some((col, row)) = parse_address(token) {
            refs.insert(CellAddress::new(sheet, col, row));
        } else if config.reject_unresolved_names {
            return Err(EngineError::UnresolvedReference(token.to_string()));
        }
    }

    let mut refs: Vec<CellAddress> = refs.into_iter().collect();
    refs.sort();
    Ok(refs)
}

/// Parse `raw` and extract its references. Non-formulas and unknown functions
/// have none.
pub fn extract_references_from_text(
    raw: &str,
    sheet: SheetId,
    names: &NamedRangeStore,
    config: &EngineConfig,
) -> Result<Vec<CellAddress>, EngineError> {
    match parse(raw)? {
        ParseOutcome::Call(call) => extract_references(&call, sheet, names, config),
        ParseOutcome::Constant | ParseOutcome::Unevaluated => Ok(Vec::new()),
    }
}

/// True if any reference token of `call` spells one of `names` (case-insensitive).
pub fn mentions_any(call: &FormulaCall, names: &[&str]) -> bool {
    call.references()
        .any(|token| names.iter().any(|name| token.eq_ignore_ascii_case(name)))
}

fn check_size(token: &str, cells: usize, config: &EngineConfig) -> Result<(), EngineError> {
    if cells > config.max_range_cells {
        return Err(EngineError::RangeTooLarge {
            token: token.to_string(),
            limit: config.max_range_cells,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::named_range::{NamedRange, Rect};

    const S: SheetId = SheetId::DEFAULT;

    fn at(a1: &str) -> CellAddress {
        CellAddress::parse(S, a1).unwrap()
    }

    fn extract(formula: &str, names: &NamedRangeStore) -> Result<Vec<CellAddress>, EngineError> {
        extract_references_from_text(formula, S, names, &EngineConfig::default())
    }

    #[test]
    fn test_extract_expands_and_dedups() {
        let names = NamedRangeStore::new();
        let refs = extract("=SUM(A1:A3, A2, B1, 7)", &names).unwrap();
        assert_eq!(refs, vec![at("A1"), at("B1"), at("A2"), at("A3")]);
    }

    #[test]
    fn test_extract_non_formula_is_empty() {
        let names = NamedRangeStore::new();
        assert!(extract("hello", &names).unwrap().is_empty());
        assert!(extract("=FOO(A1)", &names).unwrap().is_empty());
    }

    #[test]
    fn test_extract_syntax_error_surfaces() {
        let names = NamedRangeStore::new();
        assert!(matches!(extract("=SUM(A1", &names), Err(EngineError::Syntax(_))));
    }

    #[test]
    fn test_named_range_expands() {
        let mut names = NamedRangeStore::new();
        names.insert(NamedRange::new("Rev", S, Rect::new(0, 0, 1, 3))).unwrap();
        assert_eq!(extract("=SUM(rev)", &names).unwrap(), vec![at("A1"), at("A2"), at("A3")]);
        assert_eq!(resolve_named_range("REV", &names).map(|c| c.len()), Some(3));
        assert_eq!(resolve_named_range("Cost", &names), None);
    }

    #[test]
    fn test_named_range_shadows_address() {
        let mut names = NamedRangeStore::new();
        names.insert(NamedRange::new("B12", S, Rect::new(0, 0, 1, 1))).unwrap();
        assert_eq!(resolve_token("B12", S, &names), Some(vec![at("A1")]));
        assert_eq!(resolve_token("B13", S, &names), Some(vec![at("B13")]));
    }

    #[test]
    fn test_unresolved_name_policy() {
        let names = NamedRangeStore::new();
        assert_eq!(
            extract("=SUM(Missing, A1)", &names),
            Err(EngineError::UnresolvedReference("Missing".into()))
        );

        let lenient = EngineConfig {
            reject_unresolved_names: false,
            ..EngineConfig::default()
        };
        let refs = extract_references_from_text("=SUM(Missing, A1)", S, &names, &lenient).unwrap();
        assert_eq!(refs, vec![at("A1")]);
    }

    #[test]
    fn test_range_too_large() {
        let names = NamedRangeStore::new();
        let small = EngineConfig {
            max_range_cells: 4,
            ..EngineConfig::default()
        };
        assert!(extract_references_from_text("=SUM(A1:B2)", S, &names, &small).is_ok());
        assert_eq!(
            extract_references_from_text("=SUM(A1:B3)", S, &names, &small),
            Err(EngineError::RangeTooLarge { token: "A1:B3".into(), limit: 4 })
        );
    }

    #[test]
    fn test_mentions_any() {
        let call = match parse("=SUM(Rev, A1)").unwrap() {
            ParseOutcome::Call(call) => call,
            other => panic!("{:?}", other),
        };
        assert!(mentions_any(&call, &["REV"]));
        assert!(mentions_any(&call, &["x", "a1"]));
        assert!(!mentions_any(&call, &["Cost"]));
    }
}
