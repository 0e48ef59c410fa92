/// Deltas are applied strictly in authoritative timestamp order, whatever
/// order they arrive in.
use std::{cell::RefCell, rc::Rc};

use netpool_shared::{ClientId, OwnerAuthority, ServerMessage, SlotState, SpawnContext};
use netpool_test::{
    client_manager, exchange_packets, messages_for, projectile, projectile_policy,
    server_manager, test_client, test_server, BehaviorLog, LocalTransportHub,
};

#[test]
fn swapped_deltas_reach_the_same_end_state() {
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = server_manager(&pools, &log);
    let client_id = ClientId::new(1);

    // walk slot 0 up to generation 5 before the deltas under test
    for _ in 0..4 {
        let key = server
            .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
            .unwrap();
        server.release(key).unwrap();
    }
    let history = messages_for(&mut server, client_id);

    let d1_key = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    assert_eq!(d1_key.generation(), 5);
    server.release(d1_key).unwrap();
    let d2_key = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    assert_eq!(d2_key.generation(), 6);

    let tail = messages_for(&mut server, client_id);
    assert!(tail.iter().all(|message| matches!(message, ServerMessage::Delta(_))));
    let mut reversed = tail.clone();
    reversed.reverse();

    let mut in_order = client_manager(1, 30, &pools, &log);
    let mut swapped = client_manager(1, 30, &pools, &log);
    for message in history.iter().cloned() {
        in_order.receive_server_message(message.clone()).unwrap();
        swapped.receive_server_message(message).unwrap();
    }
    for message in tail {
        in_order.receive_server_message(message).unwrap();
    }
    for message in reversed {
        swapped.receive_server_message(message).unwrap();
    }

    let expected = server.slot(d2_key.slot()).unwrap();
    assert_eq!(expected.state, SlotState::Active);
    assert_eq!(in_order.slot(d2_key.slot()).unwrap(), expected);
    assert_eq!(swapped.slot(d2_key.slot()).unwrap(), expected);
    assert!(swapped.is_active(d2_key));
    assert!(!swapped.is_resyncing(&projectile()));
}

#[test]
fn packets_delivered_newest_first_are_reordered() {
    let hub = LocalTransportHub::new();
    let log = Rc::new(RefCell::new(BehaviorLog::default()));
    let pools = [(projectile(), projectile_policy())];
    let mut server = test_server(&hub, &pools, &log);
    let mut client = test_client(&hub, 1, &pools, &log);
    server.connect_user(client.client_id()).unwrap();
    exchange_packets(&mut server, &mut [&mut client]);

    let first = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    server.send_all_packets();
    server.release(first).unwrap();
    let second = server
        .acquire(&projectile(), OwnerAuthority::Server, SpawnContext::default())
        .unwrap();
    server.send_all_packets();

    assert_eq!(hub.queued_for(client.client_id()), 2);
    hub.reverse_queue_for(client.client_id());
    client.receive_all_packets();
    client.process_all_packets();

    assert_eq!(second.slot(), first.slot());
    assert_eq!(client.slot(second.slot()).unwrap(), server.slot(second.slot()).unwrap());
    assert!(client.is_active(second));
    assert!(!client.is_resyncing(&projectile()));
}
