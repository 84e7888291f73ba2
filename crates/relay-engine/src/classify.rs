//! Reduces arbitrary failures to a single readable cause.

use std::error::Error;

use crate::signer::SignerError;

const STRIPPED_PREFIXES: &[&str] = &["Error:", "ContractFunctionRevertedError:"];

/// Picks the most specific human-readable message out of `err` and its
/// `source()` chain.
///
/// Preference order: a contract revert anywhere in the chain, then the first
/// signer-provided short message, then the error's own message, then the first
/// non-empty message further down the chain, and finally the debug form.
pub fn classify(err: &(dyn Error + 'static)) -> String {
    let message = revert_message(err)
        .or_else(|| short_message(err))
        .or_else(|| chain(err).map(|cause| cause.to_string()).find(|m| !m.trim().is_empty()))
        .unwrap_or_else(|| format!("{err:?}"));
    strip_prefix(&message)
}

fn chain<'a>(err: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(err), |&cause| cause.source())
}

fn revert_message(err: &(dyn Error + 'static)) -> Option<String> {
    chain(err)
        .filter_map(|cause| cause.downcast_ref::<SignerError>())
        .find_map(|signer| {
            let revert = signer.revert.as_ref()?;
            revert
                .reason
                .clone()
                .or_else(|| signer.short_message.clone())
                .or_else(|| revert.error_name.clone())
                .or_else(|| Some(signer.message.clone()))
        })
}

fn short_message(err: &(dyn Error + 'static)) -> Option<String> {
    chain(err)
        .filter_map(|cause| cause.downcast_ref::<SignerError>())
        .find_map(|signer| signer.short_message.clone())
        .filter(|short| !short.trim().is_empty())
}

fn strip_prefix(message: &str) -> String {
    let trimmed = message.trim();
    STRIPPED_PREFIXES
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}
