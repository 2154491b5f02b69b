use coinnet_engine::config::EngineConfig;
use coinnet_engine::core::{ExchangeService, ProofUpload, ResolutionRequest};
use coinnet_engine::types::{
    Availability, ErrorKind, NewProvider, NewUser, Principal, ProviderId, Role, TransactionId,
    TransactionStatus,
};
use rstest::{fixture, rstest};
use rust_decimal_macros::dec;

struct World {
    exchange: ExchangeService,
    admin: Principal,
    user: Principal,
    user_credential: String,
    stranger: Principal,
    merchant: Principal,
    provider: ProviderId,
}

fn register(exchange: &ExchangeService, email: &str, role: Role) -> Principal {
    let credential = register_credential(exchange, email, role);
    exchange.authenticate(&credential).unwrap()
}

fn register_credential(exchange: &ExchangeService, email: &str, role: Role) -> String {
    let (_, credential) = exchange
        .users()
        .register(NewUser {
            email: email.to_string(),
            full_name: email.split('@').next().unwrap_or("someone").to_string(),
            phone: None,
            role,
        })
        .unwrap();
    credential
}

#[fixture]
fn world() -> World {
    let exchange = ExchangeService::new(EngineConfig::default());
    let (_, credential) = exchange
        .users()
        .register_admin("root@coinnet.local", "Root Admin")
        .unwrap();
    let admin = exchange.authenticate(&credential).unwrap();
    let user_credential = register_credential(&exchange, "ana@example.com", Role::Regular);
    let user = exchange.authenticate(&user_credential).unwrap();
    let stranger = register(&exchange, "ben@example.com", Role::Regular);
    let merchant = register(&exchange, "maria@example.com", Role::ProviderBusiness);

    let provider = exchange
        .create_provider(
            &merchant,
            NewProvider {
                business_name: "Pulperia Central".to_string(),
                settlement_account: "88887777".to_string(),
                settlement_holder_name: "Maria Solis".to_string(),
                bank_email: "maria@bank.example".to_string(),
                address: Some("Avenida 2, San Jose".to_string()),
                latitude: 9.9281,
                longitude: -84.0907,
                description: None,
                min_amount: None,
                max_amount: None,
            },
        )
        .unwrap();
    exchange
        .set_availability(
            &merchant,
            provider.id,
            Availability {
                is_available: true,
                declared_liquidity: Some(dec!(150000)),
            },
        )
        .unwrap();

    World {
        exchange,
        admin,
        user,
        user_credential,
        stranger,
        merchant,
        provider: provider.id,
    }
}

fn proof(content: &str) -> ProofUpload {
    ProofUpload {
        content: content.as_bytes().to_vec(),
        mime_type: None,
        filename: Some("receipt.jpg".to_string()),
    }
}

fn request(world: &World) -> TransactionId {
    world
        .exchange
        .create_transaction(&world.user, world.provider, dec!(20000))
        .unwrap()
        .id
}

#[rstest]
fn test_happy_path_to_completion(world: World) {
    let exchange = &world.exchange;
    let view = exchange
        .create_transaction(&world.user, world.provider, dec!(20000))
        .unwrap();

    assert_eq!(view.status, TransactionStatus::Requested);
    assert_eq!(view.commission_amount, dec!(1000.00));
    assert_eq!(view.total_to_send, dec!(21000.00));
    assert_eq!(view.settlement.as_ref().unwrap().account, "88887777");
    assert!(view.code.starts_with("CN-"));

    let id = view.id;
    exchange.accept(&world.merchant, id).unwrap();
    exchange.mark_sinpe_sent(&world.user, id).unwrap();
    exchange.upload_proof(&world.user, id, proof("receipt-0042")).unwrap();
    exchange.verify(&world.merchant, id).unwrap();
    let done = exchange.complete(&world.merchant, id).unwrap();
    assert_eq!(done.status, TransactionStatus::Completed);

    let tx = exchange.get_transaction(&world.user, id).unwrap();
    let statuses: Vec<TransactionStatus> = tx.timeline.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            TransactionStatus::Requested,
            TransactionStatus::Accepted,
            TransactionStatus::SinpeSent,
            TransactionStatus::ProofUploaded,
            TransactionStatus::Verified,
            TransactionStatus::Completed,
        ]
    );
    assert!(tx.proof_url.is_some());

    let provider = exchange.get_my_provider(&world.merchant).unwrap();
    assert_eq!(provider.total_transactions, 1);
    assert_eq!(provider.total_volume, dec!(20000));
    let user = exchange.users().get(world.user.id).unwrap();
    assert_eq!(user.total_transactions, 1);
    assert_eq!(exchange.ledger().active_count(world.user.id), 0);
}

#[rstest]
fn test_proof_upload_straight_from_accepted(world: World) {
    let id = request(&world);
    world.exchange.accept(&world.merchant, id).unwrap();

    let outcome = world
        .exchange
        .upload_proof(&world.user, id, proof("receipt"))
        .unwrap();
    assert_eq!(outcome.status, TransactionStatus::ProofUploaded);
}

#[rstest]
fn test_identical_proof_reupload_adds_no_event(world: World) {
    let id = request(&world);
    world.exchange.accept(&world.merchant, id).unwrap();
    world.exchange.upload_proof(&world.user, id, proof("same bytes")).unwrap();
    let before = world.exchange.ledger().get(id).unwrap().timeline.len();

    world.exchange.upload_proof(&world.user, id, proof("same bytes")).unwrap();

    assert_eq!(world.exchange.ledger().get(id).unwrap().timeline.len(), before);
    let err = world
        .exchange
        .upload_proof(&world.user, id, proof("different bytes"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
}

#[rstest]
#[case::empty(ProofUpload { content: Vec::new(), mime_type: None, filename: Some("a.png".to_string()) })]
#[case::bad_type(ProofUpload { content: b"%PDF".to_vec(), mime_type: Some("text/plain".to_string()), filename: None })]
#[case::unknown_extension(ProofUpload { content: b"abc".to_vec(), mime_type: None, filename: Some("a.exe".to_string()) })]
fn test_invalid_proof_is_rejected(world: World, #[case] upload: ProofUpload) {
    let id = request(&world);
    world.exchange.accept(&world.merchant, id).unwrap();

    let err = world.exchange.upload_proof(&world.user, id, upload).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        world.exchange.ledger().get(id).unwrap().status,
        TransactionStatus::Accepted
    );
}

#[rstest]
fn test_wrong_parties_are_rejected(world: World) {
    let id = request(&world);
    let exchange = &world.exchange;

    assert_eq!(
        exchange.accept(&world.user, id).unwrap_err().kind(),
        ErrorKind::Authorization
    );
    assert_eq!(
        exchange.accept(&world.stranger, id).unwrap_err().kind(),
        ErrorKind::Authorization
    );
    assert_eq!(
        exchange.get_transaction(&world.stranger, id).unwrap_err().kind(),
        ErrorKind::Authorization
    );
    assert_eq!(
        exchange.cancel(&world.stranger, id, None).unwrap_err().kind(),
        ErrorKind::Authorization
    );

    exchange.accept(&world.merchant, id).unwrap();
    assert_eq!(
        exchange.mark_sinpe_sent(&world.merchant, id).unwrap_err().kind(),
        ErrorKind::Authorization
    );
}

#[rstest]
fn test_out_of_order_transition_is_state_conflict(world: World) {
    let id = request(&world);

    let err = world.exchange.verify(&world.merchant, id).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StateConflict);
    assert_eq!(world.exchange.ledger().get(id).unwrap().timeline.len(), 1);
}

#[rstest]
fn test_terminal_transactions_are_frozen(world: World) {
    let id = request(&world);
    world.exchange.cancel(&world.user, id, Some("Changed my mind".to_string())).unwrap();

    for result in [
        world.exchange.accept(&world.merchant, id),
        world.exchange.cancel(&world.admin, id, None),
        world.exchange.open_dispute(&world.user, id, "Never received any cash"),
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::StateConflict);
    }
    let tx = world.exchange.ledger().get(id).unwrap();
    assert_eq!(tx.timeline.last().unwrap().notes, "Changed my mind");
}

#[rstest]
fn test_capacity_limit_and_release(world: World) {
    let exchange = &world.exchange;
    let first = request(&world);
    request(&world);

    let err = exchange
        .create_transaction(&world.user, world.provider, dec!(5000))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Capacity);

    exchange.cancel(&world.merchant, first, None).unwrap();
    exchange
        .create_transaction(&world.user, world.provider, dec!(5000))
        .unwrap();
    assert_eq!(exchange.ledger().active_count(world.user.id), 2);
}

#[rstest]
#[case::below_min(dec!(999))]
#[case::above_max(dec!(100001))]
#[case::zero(dec!(0))]
#[case::negative(dec!(-5))]
fn test_amount_outside_bounds(world: World, #[case] amount: rust_decimal::Decimal) {
    let err = world
        .exchange
        .create_transaction(&world.user, world.provider, amount)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(world.exchange.ledger().all().is_empty());
}

#[rstest]
fn test_unavailable_provider_cannot_be_requested(world: World) {
    world
        .exchange
        .set_availability(
            &world.merchant,
            world.provider,
            Availability {
                is_available: false,
                declared_liquidity: None,
            },
        )
        .unwrap();

    let err = world
        .exchange
        .create_transaction(&world.user, world.provider, dec!(5000))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[rstest]
fn test_dispute_resolved_to_completed_counts_once(world: World) {
    let exchange = &world.exchange;
    let id = request(&world);
    exchange.accept(&world.merchant, id).unwrap();
    exchange
        .open_dispute(&world.merchant, id, "User says transfer sent, nothing arrived")
        .unwrap();

    assert_eq!(exchange.list_open_disputes(&world.admin).unwrap().len(), 1);
    assert_eq!(
        exchange.list_open_disputes(&world.user).unwrap_err().kind(),
        ErrorKind::Authorization
    );

    let resolution = ResolutionRequest {
        final_status: TransactionStatus::Completed,
        resolution: "Bank statement confirms the transfer".to_string(),
        admin_notes: String::new(),
    };
    let outcome = exchange
        .resolve_dispute(&world.admin, id, resolution.clone())
        .unwrap();
    assert_eq!(outcome.message, "Dispute resolved. Transaction is now completed.");

    let err = exchange.resolve_dispute(&world.admin, id, resolution).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    assert_eq!(exchange.get_my_provider(&world.merchant).unwrap().total_transactions, 1);
    assert!(exchange.list_open_disputes(&world.admin).unwrap().is_empty());
}

#[rstest]
fn test_non_admin_cannot_resolve(world: World) {
    let id = request(&world);
    world
        .exchange
        .open_dispute(&world.user, id, "Provider asked for more money")
        .unwrap();

    let err = world
        .exchange
        .resolve_dispute(
            &world.user,
            id,
            ResolutionRequest {
                final_status: TransactionStatus::Cancelled,
                resolution: "I win".to_string(),
                admin_notes: String::new(),
            },
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(
        world.exchange.ledger().get(id).unwrap().status,
        TransactionStatus::Disputed
    );
}

#[rstest]
fn test_settlement_details_only_for_participants(world: World) {
    let id = request(&world);

    let owner_view = world.exchange.get_transaction(&world.user, id).unwrap();
    let provider_view = world.exchange.get_transaction(&world.merchant, id).unwrap();
    let admin_view = world.exchange.get_transaction(&world.admin, id).unwrap();

    assert!(owner_view.settlement.is_some());
    assert!(provider_view.settlement.is_some());
    assert!(admin_view.settlement.is_none());
}

#[rstest]
fn test_pending_queue_and_listing(world: World) {
    let exchange = &world.exchange;
    let first = request(&world);
    let second = request(&world);
    exchange.cancel(&world.user, first, None).unwrap();

    let pending = exchange.list_pending_for_provider(&world.merchant).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second);

    let mine = exchange.list_mine(&world.user).unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, second);

    let err = exchange.list_pending_for_provider(&world.user).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[rstest]
fn test_find_nearby_prefers_verified_providers(world: World) {
    let exchange = &world.exchange;
    let other = register(exchange, "luis@example.com", Role::ProviderBusiness);
    let far = exchange
        .create_provider(
            &other,
            NewProvider {
                business_name: "Soda La Esquina".to_string(),
                settlement_account: "87776666".to_string(),
                settlement_holder_name: "Luis Vega".to_string(),
                bank_email: "luis@bank.example".to_string(),
                address: None,
                latitude: 9.9350,
                longitude: -84.0800,
                description: None,
                min_amount: Some(dec!(2000)),
                max_amount: Some(dec!(50000)),
            },
        )
        .unwrap();
    exchange
        .set_availability(
            &other,
            far.id,
            Availability {
                is_available: true,
                declared_liquidity: None,
            },
        )
        .unwrap();
    exchange.verify_provider(&world.admin, far.id).unwrap();

    let names: Vec<String> = exchange
        .find_nearby(&world.user, 9.9281, -84.0907, None, None)
        .unwrap()
        .map(|view| view.business_name)
        .collect();
    assert_eq!(names, vec!["Soda La Esquina", "Pulperia Central"]);

    let names: Vec<String> = exchange
        .find_nearby(&world.user, 9.9281, -84.0907, None, Some(dec!(1500)))
        .unwrap()
        .map(|view| view.business_name)
        .collect();
    assert_eq!(names, vec!["Pulperia Central"]);

    let err = exchange
        .find_nearby(&world.user, 9.9281, -84.0907, Some(0.0), None)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[rstest]
fn test_suspensions(world: World) {
    let exchange = &world.exchange;
    exchange.suspend_provider(&world.admin, world.provider).unwrap();
    let err = exchange
        .create_transaction(&world.user, world.provider, dec!(5000))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    exchange.suspend_user(&world.admin, world.user.id).unwrap();
    let suspended = exchange.authenticate(&world.user_credential).unwrap();
    assert_eq!(
        exchange.list_mine(&suspended).unwrap_err().kind(),
        ErrorKind::Authorization
    );

    let err = exchange.suspend_user(&world.stranger, world.merchant.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}
