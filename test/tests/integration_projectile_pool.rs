/// ProjectileA: a fixed pool of ten replicated to a connected client.
///
/// Ten acquires succeed, the eleventh fails with PoolExhausted, and one
/// release makes the next acquire return the freed slot one generation
/// later, on the server and on the client alike.
use std::{cell::RefCell, rc::Rc};

use netpool_shared::{
    ActivatedEvent, GameplayPoolAccess, OwnerAuthority, PoolError, ReleasedEvent, SlotState,
    SpawnContext, SpawnOutcome, SpawnTask, Transform,
};
use netpool_test::{
    exchange_packets, projectile, projectile_policy, test_client, test_server, BehaviorLog,
    LocalTransportHub,
};

#[test]
fn eleventh_acquire_fails_and_a_release_frees_the_slot() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &log);
    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let mut keys = Vec::new();
    for _ in 0..10 {
        keys.push(
            server
                .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
                .unwrap(),
        );
    }
    let eleventh = server.acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default());
    assert!(matches!(eleventh, Err(PoolError::PoolExhausted { max_size: 10, .. })));

    exchange_packets(&mut server, &mut [&mut client]);
    assert_eq!(client.pool_counts(&projectile()).unwrap().active, 10);
    assert_eq!(client.take_events().read::<ActivatedEvent>().count(), 10);

    let freed = keys[4];
    server.release(freed).unwrap();
    let next = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    assert_eq!(next.slot(), freed.slot());
    assert_eq!(next.generation(), freed.generation() + 1);
    assert!(!server.is_active(freed));
    assert!(server.is_active(next));

    exchange_packets(&mut server, &mut [&mut client]);
    let view = client.slot(next.slot()).unwrap();
    assert_eq!(view.state, SlotState::Active);
    assert_eq!(view.generation, next.generation());
    assert!(client.is_active(next));
    let mut events = client.take_events();
    assert_eq!(events.read::<ReleasedEvent>().collect::<Vec<_>>(), vec![freed.slot()]);
}

#[test]
fn spawn_transform_reaches_the_client_handle() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &log);
    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let transform = Transform::from_location([12.0, -3.5, 100.0]);
    let key = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::at(transform))
        .unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let handle = client.handle(key.slot()).unwrap();
    assert!(handle.visible);
    assert_eq!(handle.key, Some(key));
    assert_eq!(handle.transform, Some(transform));
    assert_eq!(client.slot(key.slot()).unwrap().transform, Some(transform));
}

#[test]
fn spawn_task_only_spawns_on_the_authority() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &log);
    let mut client = test_client(&hub, 1, &pools, &log);

    let task = SpawnTask::new(projectile(), SpawnContext::default());
    match task.clone().run(&mut server) {
        SpawnOutcome::Spawned(key) => assert!(server.is_active(key)),
        SpawnOutcome::DidNotSpawn(error) => panic!("server did not spawn: {error}"),
    }

    assert!(!client.is_authority());
    assert_eq!(
        task.run(&mut client),
        SpawnOutcome::DidNotSpawn(PoolError::NotAuthority {
            operation: "spawn task",
        })
    );
    assert_eq!(client.pool_counts(&projectile()).unwrap().in_use(), 0);
}
