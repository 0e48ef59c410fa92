/// Clients that lose track of a pool ask for a snapshot and rebuild from it.
use std::{cell::RefCell, rc::Rc};

use netpool_shared::{
    AcquireGrantedEvent, AcquireTicket, ActivatedEvent, ClientMessage, OwnerAuthority, PoolPolicy,
    PoolTag, PredictionMissEvent, ReplicationDelta, ResyncRequestedEvent, ServerMessage, SlotId,
    SlotState, SpawnContext, Stamp, Transform,
};
use netpool_test::{
    client_manager, exchange_packets, projectile, projectile_policy, test_client, test_server,
    BehaviorLog, LocalTransportHub,
};

fn slot_ids(capacity: u16) -> Vec<SlotId> {
    (0..capacity)
        .map(|index| SlotId::new(PoolTag::new(0), index))
        .collect()
}

#[test]
fn lost_packets_trigger_a_resync_that_restores_server_state() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();

    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let policy = PoolPolicy {
        resync_drift_window: 4,
        ..projectile_policy()
    };
    let pools = [(projectile(), policy)];
    let mut server = test_server(&hub, &pools, &log);
    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);
    client.take_events();

    // stamps 1 through 6 never arrive
    for _ in 0..2 {
        let key = server
            .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
            .unwrap();
        server.release(key).unwrap();
    }
    server.send_all_packets();
    assert!(hub.drop_queue_for(client.client_id()) > 0);

    let live = server
        .acquire(
            &projectile(),
            OwnerAuthority::Server,
            SpawnContext::at(Transform::from_location([1.0, 2.0, 3.0])),
        )
        .unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    assert!(client.is_resyncing(&projectile()));
    let mut events = client.take_events();
    assert_eq!(
        events.read::<ResyncRequestedEvent>().collect::<Vec<_>>(),
        vec![projectile()]
    );
    assert!(!client.is_active(live));

    exchange_packets(&mut server, &mut [&mut client]);

    assert!(!client.is_resyncing(&projectile()));
    assert!(client.is_active(live));
    for slot in slot_ids(10) {
        assert_eq!(client.slot(slot).unwrap(), server.slot(slot).unwrap());
    }

    // the stream continues from the snapshot's stamp
    server.release(live).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);
    assert_eq!(client.slot(live.slot()).unwrap().state, SlotState::Pooled);
    assert!(!client.is_resyncing(&projectile()));
}

#[test]
fn late_joiner_mirrors_the_pool_from_its_snapshot() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &log);

    let mut keys = Vec::new();
    for i in 0..6 {
        let transform = Transform::from_location([i as f32, 0.0, 0.0]);
        keys.push(
            server
                .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::at(transform))
                .unwrap(),
        );
    }
    server.release(keys.remove(2)).unwrap();
    server.send_all_packets();
    assert_eq!(server.snapshot(&projectile()).unwrap().len(), 3);

    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    for slot in slot_ids(10) {
        assert_eq!(client.slot(slot).unwrap(), server.slot(slot).unwrap());
    }
    for key in &keys {
        assert!(client.is_active(*key));
        assert_eq!(
            client.handle(key.slot()).unwrap().transform,
            server.slot(key.slot()).unwrap().transform
        );
    }
    let mut events = client.take_events();
    assert_eq!(events.read::<ActivatedEvent>().count(), keys.len());

    let next = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    exchange_packets(&mut server, &mut [&mut client]);
    assert!(client.is_active(next));
}

#[test]
fn snapshot_keeps_a_prediction_that_is_still_in_flight() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &log);
    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();

    // predicted before the connect snapshot has arrived
    let ticket = client
        .request_acquire(&projectile(), SpawnContext::default())
        .unwrap();
    let AcquireTicket::Requested {
        request,
        predicted: Some(key),
    } = ticket
    else {
        panic!("expected a predicted request, got {ticket:?}");
    };

    exchange_packets(&mut server, &mut [&mut client]);

    let granted = server.slot(key.slot()).unwrap();
    assert_eq!(granted.owner, OwnerAuthority::Client(client.client_id()));
    assert_eq!(client.slot(key.slot()).unwrap(), granted);
    let mut events = client.take_events();
    assert!(!events.has::<PredictionMissEvent>());
    assert_eq!(
        events.read::<AcquireGrantedEvent>().collect::<Vec<_>>(),
        vec![(request, granted.key())]
    );
}

#[test]
fn generation_gap_requests_a_resync() {
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut client = client_manager(1, 30, &pools, &log);

    let slot = SlotId::new(PoolTag::new(0), 2);
    client
        .receive_server_message(ServerMessage::Delta(ReplicationDelta {
            slot,
            archetype: projectile(),
            from_generation: 5,
            to_state: SlotState::Active,
            to_generation: 6,
            authoritative_timestamp: Stamp::new(1),
            owner: OwnerAuthority::Server,
            transform: None,
        }))
        .unwrap();

    assert!(client.is_resyncing(&projectile()));
    let view = client.slot(slot).unwrap();
    assert_eq!(view.state, SlotState::Pooled);
    assert_eq!(view.generation, 0);
    assert_eq!(
        client.take_client_outgoing(),
        vec![ClientMessage::ResyncRequest {
            archetype: projectile()
        }]
    );
    assert!(client.take_events().has::<ResyncRequestedEvent>());
}

#[test]
fn unanswered_resync_is_reissued_after_the_timeout() {
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let policy = PoolPolicy {
        resync_drift_window: 4,
        ..projectile_policy()
    };
    let pools = [(projectile(), policy)];
    let mut client = client_manager(1, 3, &pools, &log);

    client
        .receive_server_message(ServerMessage::Delta(ReplicationDelta {
            slot: SlotId::new(PoolTag::new(0), 0),
            archetype: projectile(),
            from_generation: 0,
            to_state: SlotState::Active,
            to_generation: 1,
            authoritative_timestamp: Stamp::new(9),
            owner: OwnerAuthority::Server,
            transform: None,
        }))
        .unwrap();
    assert_eq!(client.take_client_outgoing().len(), 1);

    client.advance_step();
    client.advance_step();
    assert!(client.take_client_outgoing().is_empty());

    client.advance_step();
    assert_eq!(
        client.take_client_outgoing(),
        vec![ClientMessage::ResyncRequest {
            archetype: projectile()
        }]
    );
    assert!(client.is_resyncing(&projectile()));
}
