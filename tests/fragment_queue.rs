use proptest::prelude::*;
use rak_server::{
    connection::queue::FragmentQueue,
    error::ProtocolError,
    protocol::{
        frame::{FragmentMeta, Frame},
        reliability::Reliability,
    },
};

#[test]
fn test_proper_reordering() {
    let mut queue = FragmentQueue::default();

    const SLICE_ONE: &[u8] = &[1, 2, 3, 4, 5];
    const SLICE_TWO: &[u8] = &[6, 7, 8, 9, 10];
    const SLICE_THREE: &[u8] = &[11, 12, 13, 14, 15];

    // push slice 2 first, then slice 1, then slice 3
    let res = queue
        .insert(
            Frame::new(Reliability::ReliableOrd, Some(SLICE_TWO))
                .with_meta(FragmentMeta::new(3, 11, 1)),
        )
        .unwrap();
    assert!(res.is_none());

    let res = queue
        .insert(
            Frame::new(Reliability::ReliableOrd, Some(SLICE_ONE))
                .with_meta(FragmentMeta::new(3, 11, 0)),
        )
        .unwrap();
    assert!(res.is_none());
    assert_eq!(queue.pending(), 1);

    let res = queue
        .insert(
            Frame::new(Reliability::ReliableOrd, Some(SLICE_THREE))
                .with_meta(FragmentMeta::new(3, 11, 2)),
        )
        .unwrap()
        .unwrap();

    assert_eq!(res.body, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    assert!(res.fragment_meta.is_none());
    assert_eq!(queue.pending(), 0);
}

#[test]
fn duplicate_fragments_are_ignored() {
    let mut queue = FragmentQueue::default();
    let part = |index: u32, body: &[u8]| {
        Frame::new(Reliability::Reliable, Some(body)).with_meta(FragmentMeta::new(2, 4, index))
    };

    assert!(queue.insert(part(0, &[1])).unwrap().is_none());
    assert!(queue.insert(part(0, &[9])).unwrap().is_none());
    assert_eq!(queue.insert(part(1, &[2])).unwrap().unwrap().body, vec![1, 2]);
}

#[test]
fn rejects_bad_fragments() {
    let mut queue = FragmentQueue::new(4, 1);

    let too_many = Frame::new(Reliability::Reliable, Some(&[1]))
        .with_meta(FragmentMeta::new(5, 0, 0));
    assert_eq!(
        queue.insert(too_many),
        Err(ProtocolError::TooManySplits { count: 5, max: 4 })
    );

    let out_of_bounds = Frame::new(Reliability::Reliable, Some(&[1]))
        .with_meta(FragmentMeta::new(2, 0, 2));
    assert_eq!(
        queue.insert(out_of_bounds),
        Err(ProtocolError::FragmentIndexOutOfBounds { index: 2, count: 2 })
    );

    let first = Frame::new(Reliability::Reliable, Some(&[1]))
        .with_meta(FragmentMeta::new(2, 0, 0));
    assert!(queue.insert(first).unwrap().is_none());

    let second_split = Frame::new(Reliability::Reliable, Some(&[1]))
        .with_meta(FragmentMeta::new(2, 1, 0));
    assert_eq!(
        queue.insert(second_split),
        Err(ProtocolError::TooManyPendingSplits { max: 1 })
    );
}

#[test]
fn split_refuses_too_many_fragments() {
    let mut queue = FragmentQueue::new(2, 64);
    let frame = Frame::new(Reliability::Reliable, Some(&[0; 10]));
    assert_eq!(
        queue.split(frame, 3),
        Err(ProtocolError::TooManySplits { count: 4, max: 2 })
    );
}

proptest! {
    #[test]
    fn split_then_reassemble_is_identity(
        body in proptest::collection::vec(any::<u8>(), 1..4096),
        max_size in 4usize..512,
        seed in any::<u64>(),
    ) {
        let mut sender = FragmentQueue::default();
        let mut receiver = FragmentQueue::default();

        let frame = Frame::new(Reliability::ReliableOrd, Some(&body)).with_order(3, 7);
        let mut parts = sender.split(frame, max_size).unwrap();
        prop_assert!(parts.iter().all(|part| part.body.len() <= max_size));

        // deliver the fragments in a scrambled order
        let len = parts.len();
        for i in 0..len {
            let j = (seed as usize).wrapping_add(i * 7) % len;
            parts.swap(i, j);
        }

        let mut whole = None;
        for part in parts {
            if let Some(frame) = receiver.insert(part).unwrap() {
                prop_assert!(whole.is_none());
                whole = Some(frame);
            }
        }

        let whole = whole.unwrap();
        prop_assert_eq!(whole.body, body);
        prop_assert_eq!(whole.order_channel, Some(3));
        prop_assert_eq!(whole.order_index, Some(7));
        prop_assert_eq!(receiver.pending(), 0);
    }
}
