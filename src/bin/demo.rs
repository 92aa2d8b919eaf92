//! Confidential Asset Lifecycle Demo
//!
//! Exercises create, verify and reload in-process against the in-memory
//! registry and homomorphic runtime. No chain, no real proofs.
//!
//! Run with: `cargo run --bin demo`

use alloy::primitives::Address;

use confidential_assets::adapters::mock_fhe::MockFheRuntime;
use confidential_assets::adapters::mock_ledger::MockLedger;
use confidential_assets::coordinator::{AssetCoordinator, CoordinatorError, NewRecord};
use confidential_assets::domain::session::Session;
use confidential_assets::ports::encryption::EncryptionError;

type Coordinator = AssetCoordinator<MockLedger, MockFheRuntime, MockFheRuntime>;

fn setup(fhe: MockFheRuntime, account: Address) -> Coordinator {
    let registry = Address::repeat_byte(0xCA);
    AssetCoordinator::new(MockLedger::new(registry, account), fhe.clone(), fhe)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== Confidential Asset Tracking ===");
    println!("=== Lifecycle Demo (in-memory, no real proofs) ===\n");

    scenario_happy_path().await;
    println!("\n{}\n", "=".repeat(60));
    scenario_races().await;
    println!("\n{}\n", "=".repeat(60));
    scenario_encryption_unavailable().await;

    println!("\n=== All scenarios completed successfully ===");
}

async fn scenario_happy_path() {
    println!("--- Scenario 1: Create → Verify → Re-verify ---\n");

    let account = Address::repeat_byte(0xA1);
    let session = Session::connected(account);
    let coordinator = setup(MockFheRuntime::new(), account);
    println!("[Setup] Connected as {account}");
    println!(
        "  System available: {}",
        coordinator.check_availability().await.unwrap()
    );

    // ── Create ──
    println!("\n[Create] Registering \"Laptop\" (value 42, electronics, status 0)...");
    let input = NewRecord::from_fields("Laptop", "42", "electronics", "0").unwrap();
    let created = coordinator.create_record(&session, input).await.unwrap();
    println!(
        "  {} final in block {} (tx 0x{}...)",
        created.id,
        created.receipt.block_number,
        &created.receipt.tx_hash.to_string()[2..18]
    );

    let record = coordinator.cache().get(&created.id).unwrap();
    println!("  category: {}", record.category);
    println!("  status:   {}", record.status_label());
    println!("  handle:   {}", record.ciphertext_handle);
    println!("  state:    {}", record.verification);

    // ── Verify ──
    println!("\n[Verify] Decrypting off-chain and committing the proof...");
    let outcome = coordinator.verify_record(&session, &created.id).await.unwrap();
    println!("  revealed value: {} ({:?})", outcome.value, outcome.path);
    println!(
        "  state:    {}",
        coordinator.cache().get(&created.id).unwrap().verification
    );

    // ── Re-verify ──
    println!("\n[Re-verify] Verifying the same record again...");
    let before = coordinator.ledger().submission_count().await;
    let again = coordinator.verify_record(&session, &created.id).await.unwrap();
    let after = coordinator.ledger().submission_count().await;
    println!("  value: {} ({:?})", again.value, again.path);
    println!("  transactions submitted: {}", after - before);
    assert_eq!(after, before);

    let stats = coordinator.cache().stats();
    println!(
        "\n[Stats] total: {}  verified: {}  active: {}",
        stats.total, stats.verified, stats.active
    );
}

async fn scenario_races() {
    println!("--- Scenario 2: Competing Verifications ---\n");

    let account = Address::repeat_byte(0xB2);
    let session = Session::connected(account);
    let coordinator = setup(MockFheRuntime::new(), account);

    let ring = coordinator
        .create_record(
            &session,
            NewRecord::from_fields("Gold Ring", "1200", "jewelry", "in transit").unwrap(),
        )
        .await
        .unwrap();
    let deed = coordinator
        .create_record(
            &session,
            NewRecord::from_fields("Warehouse Deed", "87", "documents", "alert").unwrap(),
        )
        .await
        .unwrap();
    println!("[Setup] Created {} and {}", ring.id, deed.id);

    // ── Preempted ──
    println!("\n[Preempt] Another party commits {} first...", ring.id);
    coordinator.ledger().preempt_next_verify().await;
    let outcome = coordinator.verify_record(&session, &ring.id).await.unwrap();
    println!("  adopted value: {} ({:?})", outcome.value, outcome.path);

    // ── Concurrent ──
    println!("\n[Concurrent] Two verifications of {} at once...", deed.id);
    let (a, b) = tokio::join!(
        coordinator.verify_record(&session, &deed.id),
        coordinator.verify_record(&session, &deed.id),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    println!("  first:  {} ({:?})", a.value, a.path);
    println!("  second: {} ({:?})", b.value, b.path);
    println!(
        "  cleartexts committed on-chain: {}",
        coordinator.ledger().committed_verifications().await
    );

    // ── Search ──
    println!("\n[Search] \"ring\"");
    for record in coordinator.cache().search("ring") {
        println!("  {} {} [{}]", record.id, record.name, record.verification);
    }

    let stats = coordinator.cache().stats();
    println!(
        "\n[Stats] total: {}  verified: {}  active: {}",
        stats.total, stats.verified, stats.active
    );
}

async fn scenario_encryption_unavailable() {
    println!("--- Scenario 3: Encryption Runtime Not Initialized ---\n");

    let account = Address::repeat_byte(0xC3);
    let session = Session::connected(account);
    let coordinator = setup(MockFheRuntime::uninitialized(), account);

    let input = NewRecord::from_fields("Sketch", "5", "art", "0").unwrap();
    match coordinator.create_record(&session, input).await {
        Err(CoordinatorError::Encryption(EncryptionError::Unavailable)) => {
            println!("  creation refused: encryption unavailable");
        }
        other => panic!("expected EncryptionUnavailable, got {other:?}"),
    }

    let report = coordinator.reload().await.unwrap();
    println!("  records on ledger: {}", report.stats.total);
    println!(
        "  transactions submitted: {}",
        coordinator.ledger().submission_count().await
    );
}
