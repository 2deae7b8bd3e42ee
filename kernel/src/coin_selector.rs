use kernel_common::errors::{ErrorKind, KernelResult};
use kernel_common::model::{OutpointKey, ScriptClass, Utxo};
use std::collections::HashSet;

/// Deterministic largest-first coin selection (§4.1).
///
/// Filters to `Standard` UTXOs not in `locked_keys`, sorts by amount
/// descending, and accumulates until the running total reaches
/// `target_sompi + fee_sompi`.
pub fn select_utxos(
    utxos: &[Utxo],
    target_sompi: u64,
    fee_sompi: u64,
    locked_keys: &HashSet<OutpointKey>,
) -> KernelResult<(Vec<Utxo>, u64)> {
    let mut candidates: Vec<&Utxo> = utxos
        .iter()
        .filter(|u| u.script_class == ScriptClass::Standard && !locked_keys.contains(&u.outpoint()))
        .collect();

    if candidates.is_empty() && utxos.iter().any(|u| u.script_class == ScriptClass::Covenant) {
        return Err(ErrorKind::CovenantOnlyFunds);
    }

    candidates.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.outpoint().to_string().cmp(&b.outpoint().to_string())));

    let threshold = target_sompi.saturating_add(fee_sompi);
    let mut selected = Vec::new();
    let mut running_total = 0u64;
    for utxo in candidates {
        selected.push(utxo.clone());
        running_total = running_total.saturating_add(utxo.amount);
        if running_total >= threshold {
            return Ok((selected, running_total));
        }
    }

    Err(ErrorKind::InsufficientFunds(format!(
        "have {running_total} sompi, need {threshold} sompi"
    )))
}
