//! Walks through issue, verify, redeem, split, and remint against an
//! in-process mint, printing each step.

use std::sync::Arc;

use chaumian_mint::{
    DenominationRegistry, DenominationSelector, InMemoryKeyStore, InMemoryLedger, MintConfig,
    MintController, VerifyOutcome,
};

fn main() {
    tracing_subscriber::fmt::init();

    let registry = Arc::new(DenominationRegistry::bootstrap());
    let config = MintConfig::default();
    let key_store = Arc::new(InMemoryKeyStore::new(registry.clone(), config));
    let ledger = Arc::new(InMemoryLedger::new());
    let mint = MintController::new(registry, key_store, ledger);

    println!("== issue ==");
    let issued = mint
        .issue_single(DenominationSelector::Default, None)
        .expect("issue");
    println!(
        "issued token for denomination {} ({}), signature {}",
        issued.denomination.value,
        issued.denomination.currency,
        hex::encode(&issued.token.signature)
    );

    println!("\n== verify ==");
    match mint.verify(&issued.token).expect("verify") {
        VerifyOutcome::Valid { token_id, .. } => println!("token {token_id} is valid"),
        VerifyOutcome::Invalid { reason } => println!("unexpectedly invalid: {reason:?}"),
    }

    println!("\n== issue_total(1000) ==");
    let (change_tokens, batch_id) = mint.issue_total(1000, None).expect("issue_total");
    let values: Vec<u64> = change_tokens.iter().map(|t| t.denomination.value).collect();
    println!("batch {batch_id} decomposed into {values:?}, summing to {}", values.iter().sum::<u64>());

    println!("\n== split ==");
    let bigger = mint
        .issue_single(DenominationSelector::ById(5), None)
        .expect("issue");
    println!("issued a {}-value token to split", bigger.denomination.value);
    let split_outcome = mint.split(&bigger.token, 5).expect("split");
    let change_values: Vec<u64> = split_outcome
        .change
        .iter()
        .map(|t| t.denomination.value)
        .collect();
    println!(
        "redeemed 5, received change {:?} (total {})",
        change_values,
        split_outcome.change_total_value()
    );

    println!("\n== remint ==");
    let to_remint = mint
        .issue_single(DenominationSelector::ById(3), None)
        .expect("issue");
    let reminted = mint.remint(&to_remint.token).expect("remint");
    println!(
        "reminted token of value {} into {} fresh token(s) totaling {}",
        to_remint.denomination.value,
        reminted.change.len(),
        reminted.change_total_value()
    );

    println!("\n== redeem ==");
    let redeemed = mint.redeem(&issued.token).expect("redeem");
    println!(
        "redeemed token {} at {}",
        redeemed.token_id, redeemed.redeemed_at
    );

    println!("\n== double-spend rejected ==");
    match mint.redeem(&issued.token) {
        Ok(_) => println!("unexpectedly succeeded"),
        Err(err) => println!("rejected: {err}"),
    }

    println!("\n== outstanding value ==");
    let (total, redeemed_value, outstanding) = mint.outstanding_value(None);
    println!("minted {total}, redeemed {redeemed_value}, outstanding {outstanding}");
}
