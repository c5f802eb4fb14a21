use crate::core::types::{AtlasLabels, ClusterMask, LabelTable, RoiList};
use crate::error::RoiError;
use std::collections::BTreeMap;
use tracing::trace;

/// Names the atlas regions touched by at least one cluster element.
///
/// Labels at elements outside every cluster are suppressed, background (`0`) is never
/// reported, and each surviving label id yields its name once, in ascending id order.
/// A surviving id with no entry in `table` fails the whole call; no partial list is returned.
///
/// # Errors
/// * `RoiError::Alignment` if `mask` and `labels` differ in length.
/// * `RoiError::MissingLabel` for the first (lowest) surviving id absent from `table`.
pub fn resolve(mask: &ClusterMask, labels: &AtlasLabels, table: &LabelTable) -> Result<RoiList, RoiError> {
    if mask.len() != labels.len() {
        return Err(RoiError::Alignment { mask_len: mask.len(), label_len: labels.len() });
    }

    // 1. Working copy with everything outside the clusters forced to background
    let masked: Vec<i32> = mask
        .as_slice()
        .iter()
        .zip(labels.as_slice())
        .map(|(&value, &id)| if value == 0.0 { 0 } else { id })
        .collect();

    // 2. Surviving ids with element counts, ordered by id
    let mut surviving: BTreeMap<i32, usize> = BTreeMap::new();
    for id in masked {
        if id != 0 {
            *surviving.entry(id).or_insert(0) += 1;
        }
    }

    // 3. Lookup
    let mut names = Vec::with_capacity(surviving.len());
    for (id, elements) in surviving {
        let name = table.name(id).ok_or(RoiError::MissingLabel { label: id })?;
        trace!(label = id, elements, name, "label overlapped");
        names.push(name.to_string());
    }

    Ok(RoiList::from(names))
}
