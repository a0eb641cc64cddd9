//! Integration tests for the delivery selection lifecycle.
//!
//! These tests require:
//! - A database seeded from `crates/storefront/zones.yaml`
//! - The storefront running (cargo run -p luzimarket-storefront)
//!
//! Run with: cargo test -p luzimarket-integration-tests -- --ignored

use secrecy::SecretString;

use luzimarket_client::{ApiClient, CoordinatorError, DeliveryCoordinator, Phase};
use luzimarket_core::{DeliveryZone, PreferenceStatus, StateCode};
use luzimarket_integration_tests::{fresh_client, unique_email};

fn password() -> SecretString {
    SecretString::from("integration-pw-123")
}

/// First active zone of `state` as the live catalog lists it.
async fn first_zone(client: &ApiClient, state: &str) -> DeliveryZone {
    let state = StateCode::parse(state).expect("valid state");
    client
        .zones(&state)
        .await
        .expect("Failed to list zones")
        .into_iter()
        .next()
        .expect("state has no zones; seed the catalog first")
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_account_selection_is_durable() {
    let (client, _storage) = fresh_client();
    let email = unique_email();
    client
        .register(&email, &password())
        .await
        .expect("Failed to register");
    let zone = first_zone(&client, "coahuila").await;

    let mut coordinator = DeliveryCoordinator::for_client(client.clone());
    coordinator.select_state("coahuila").await.expect("select state");
    coordinator.select_zone(zone.id).expect("select zone");
    let confirmation = coordinator.confirm().await.expect("confirm");
    assert_eq!(
        confirmation.message,
        "Delivery location saved to your account."
    );

    // A brand new browser session restores it from the account.
    let (other, _storage) = fresh_client();
    other.login(&email, &password()).await.expect("Failed to log in");
    let mut restored = DeliveryCoordinator::for_client(other);
    let phase = restored.restore().await.expect("restore");
    assert!(matches!(
        phase,
        Phase::Confirmed { selection } if selection.zone_id == zone.id
    ));
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_guest_choice_wins_on_login() {
    let email = unique_email();
    let coahuila = {
        let (client, _storage) = fresh_client();
        client
            .register(&email, &password())
            .await
            .expect("Failed to register");
        let zone = first_zone(&client, "coahuila").await;
        let mut coordinator = DeliveryCoordinator::for_client(client.clone());
        coordinator.select_state("coahuila").await.expect("select state");
        coordinator.select_zone(zone.id).expect("select zone");
        coordinator.confirm().await.expect("confirm");
        zone
    };

    let (client, _storage) = fresh_client();
    client.start_guest().await.expect("Failed to start guest");
    let nuevo_leon = first_zone(&client, "nuevo-leon").await;
    assert_ne!(nuevo_leon.id, coahuila.id);

    let mut coordinator = DeliveryCoordinator::for_client(client.clone());
    coordinator.select_state("nuevo-leon").await.expect("select state");
    coordinator.select_zone(nuevo_leon.id).expect("select zone");
    let confirmation = coordinator.confirm().await.expect("confirm");
    assert_eq!(confirmation.message, "Delivery location saved for this visit.");

    client.login(&email, &password()).await.expect("Failed to log in");
    let summary = client.session().await.expect("session");
    let user_id = summary.user_id.expect("authenticated");
    coordinator.merge_on_login(user_id).await.expect("merge");

    let summary = client.session().await.expect("session");
    let PreferenceStatus::Valid { preference } = summary.delivery else {
        panic!("expected a valid durable preference, got {:?}", summary.delivery);
    };
    assert_eq!(preference.state_code.as_str(), "nuevo-leon");
    assert_eq!(preference.zone_id, nuevo_leon.id);
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_confirm_without_session_is_rejected() {
    let (client, _storage) = fresh_client();
    let zone = first_zone(&client, "coahuila").await;

    let mut coordinator = DeliveryCoordinator::for_client(client);
    coordinator.select_state("coahuila").await.expect("select state");
    coordinator.select_zone(zone.id).expect("select zone");
    assert!(matches!(
        coordinator.confirm().await,
        Err(CoordinatorError::NoActiveSession)
    ));
}
