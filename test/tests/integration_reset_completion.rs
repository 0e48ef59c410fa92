/// A released slot returns to the free list only after its reset hook
/// signals completion, on the server and on clients.
use std::{cell::RefCell, rc::Rc};

use netpool_client::{ClientConfig, PoolClient};
use netpool_server::{
    shared::{
        ClientId, OwnerAuthority, PoolError, PoolPolicy, ReleaseProgress, ReleasedEvent,
        SlotState, SpawnContext,
    },
    PoolServer, ServerConfig,
};
use netpool_test::{
    exchange_packets, exchange_packets_n_times, projectile, projectile_policy, test_client,
    test_server, BehaviorLog, LocalTransportHub, TestBehavior, TestHandle,
};

fn deferred_server(
    hub: &LocalTransportHub,
    log: &Rc<RefCell<BehaviorLog>>,
    policy: PoolPolicy,
) -> PoolServer<TestHandle> {
    let (sender, receiver) = hub.server_transport();
    let mut server = PoolServer::new(ServerConfig::default(), sender, receiver);
    server
        .register_archetype(projectile(), policy, TestBehavior::deferred(log))
        .unwrap();
    server.start_session();
    server
}

#[test]
fn reset_that_never_completes_leaves_the_slot_releasing() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let mut server = deferred_server(&hub, &log, PoolPolicy::fixed(1));

    let key = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    assert_eq!(server.release(key).unwrap(), ReleaseProgress::AwaitingReset);

    for _ in 0..10 {
        server.receive_all_packets();
        server.process_all_packets();
        server.send_all_packets();
    }
    assert_eq!(server.slot(key.slot()).unwrap().state, SlotState::Releasing);
    assert_eq!(server.pool_counts(&projectile()).unwrap().releasing, 1);
    assert!(server.take_events().read::<ReleasedEvent>().next().is_none());

    // a Releasing slot still counts against max_size
    let blocked = server.acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default());
    assert!(matches!(blocked, Err(PoolError::PoolExhausted { .. })));
}

#[test]
fn completing_the_reset_frees_the_slot() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let mut server = deferred_server(&hub, &log, PoolPolicy::fixed(1));

    let key = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    server.handle_mut(key.slot()).unwrap().score = 40;
    server.release(key).unwrap();
    server.complete_reset(key.slot()).unwrap();

    let view = server.slot(key.slot()).unwrap();
    assert_eq!(view.state, SlotState::Pooled);
    assert_eq!(view.owner, OwnerAuthority::None);
    assert_eq!(
        server.take_events().read::<ReleasedEvent>().collect::<Vec<_>>(),
        vec![key.slot()]
    );
    assert_eq!(log.borrow().released, vec![key.slot()]);
    assert_eq!(log.borrow().restored, 1);

    assert_eq!(
        server.complete_reset(key.slot()),
        Err(PoolError::ResetNotPending { slot: key.slot() })
    );

    let again = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    assert_eq!(again.generation(), key.generation() + 1);
    let handle = server.handle(again.slot()).unwrap();
    assert_eq!(handle.score, 0);
    assert_eq!(handle.activations, 2);
}

#[test]
fn client_holds_later_deltas_until_its_reset_completes() {
    let hub = LocalTransportHub::new();
    let server_log = Rc::new(RefCell::new(BehaviorLog::default()));
    let client_log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &server_log);

    let client_id = ClientId::new(1);
    let (sender, receiver) = hub.client_transport(client_id);
    let config = ClientConfig {
        client_id,
        ..ClientConfig::default()
    };
    let mut client: PoolClient<TestHandle> = PoolClient::new(config, sender, receiver);
    client
        .register_archetype(projectile(), projectile_policy(), TestBehavior::deferred(&client_log))
        .unwrap();
    client.start_session();
    server.connect_user(client_id).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let first = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    exchange_packets(&mut server, &mut [&mut client]);
    assert!(client.is_active(first));

    // server resets immediately: Releasing, Pooled, then a fresh activation
    server.release(first).unwrap();
    let second = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    assert_eq!(second.slot(), first.slot());
    exchange_packets_n_times(&mut server, &mut [&mut client], 3);

    let view = client.slot(first.slot()).unwrap();
    assert_eq!(view.state, SlotState::Releasing);
    assert!(!client.is_active(second));
    assert!(!client.is_resyncing(&projectile()));

    client.complete_reset(first.slot()).unwrap();
    assert!(client.is_active(second));
    assert_eq!(client.slot(second.slot()).unwrap(), server.slot(second.slot()).unwrap());
}

#[test]
fn client_keeps_a_releasing_slot_through_a_snapshot_until_its_reset_completes() {
    let hub = LocalTransportHub::new();
    let server_log = Rc::new(RefCell::new(BehaviorLog::default()));
    let client_log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &server_log);

    let client_id = ClientId::new(1);
    let (sender, receiver) = hub.client_transport(client_id);
    let config = ClientConfig {
        client_id,
        ..ClientConfig::default()
    };
    let mut client: PoolClient<TestHandle> = PoolClient::new(config, sender, receiver);
    client
        .register_archetype(projectile(), projectile_policy(), TestBehavior::deferred(&client_log))
        .unwrap();
    client.start_session();
    server.connect_user(client_id).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let key = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    exchange_packets(&mut server, &mut [&mut client]);
    server.release(key).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);
    assert_eq!(client.slot(key.slot()).unwrap().state, SlotState::Releasing);
    assert_eq!(client_log.borrow().deactivated, 1);
    client.take_events();

    // reconnecting sends a fresh snapshot that already shows the slot Pooled
    server.disconnect_user(client_id).unwrap();
    server.connect_user(client_id).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);
    assert_eq!(client.slot(key.slot()).unwrap().state, SlotState::Releasing);
    assert_eq!(client_log.borrow().deactivated, 1);
    assert!(client_log.borrow().released.is_empty());
    assert!(client.take_events().read::<ReleasedEvent>().next().is_none());

    client.complete_reset(key.slot()).unwrap();
    assert_eq!(client.slot(key.slot()).unwrap(), server.slot(key.slot()).unwrap());
    assert_eq!(client.slot(key.slot()).unwrap().state, SlotState::Pooled);
    assert_eq!(client_log.borrow().deactivated, 1);
    assert_eq!(client_log.borrow().released, vec![key.slot()]);
    assert_eq!(
        client.take_events().read::<ReleasedEvent>().collect::<Vec<_>>(),
        vec![key.slot()]
    );

    let next = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    exchange_packets(&mut server, &mut [&mut client]);
    assert!(client.is_active(next));
}

#[test]
fn other_slots_replicate_while_a_server_reset_is_pending() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = deferred_server(&hub, &log, projectile_policy());
    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let stuck = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    server.release(stuck).unwrap();
    let other = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    assert_ne!(other.slot(), stuck.slot());
    exchange_packets(&mut server, &mut [&mut client]);

    assert_eq!(client.slot(stuck.slot()).unwrap().state, SlotState::Releasing);
    assert!(client.is_active(other));
}
