//! Merge the refinement pass into the full-pass result.

use crate::output::{ExtractionResult, TechnicalField, TechnicalParams};
use tracing::debug;

/// Overwrite technical-parameter entries of table1 with non-empty
/// refinement values.
///
/// Every entry whose `field` names one of the four parameters is updated when
/// the refinement found a value; an empty refinement value never erases what
/// the full pass read. Entries for other fields, table2 and table3 are left
/// alone. Parameters with no table1 entry are not appended.
///
/// Returns the number of entries overwritten.
pub fn apply_refinement(base: &mut ExtractionResult, refined: &TechnicalParams) -> usize {
    let mut updated = 0;
    for entry in &mut base.table1 {
        let Some(field) = TechnicalField::from_field(&entry.field) else {
            continue;
        };
        let value = refined.get(field);
        if value.is_empty() {
            continue;
        }
        debug!("{}: {:?} → {:?}", field, entry.value, value);
        entry.value = value.to_string();
        updated += 1;
    }
    updated
}
