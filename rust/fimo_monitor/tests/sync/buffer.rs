use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

use fimo_monitor::sync::BoundedBuffer;
use fimo_monitor::Error;

use crate::init_logging;

#[test]
fn zero_capacity() {
    init_logging();
    assert!(matches!(
        BoundedBuffer::<u32>::new(0),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn fifo_order() -> Result<(), Error> {
    init_logging();
    let buffer = BoundedBuffer::new(4)?;
    for i in 0..4 {
        buffer.put(i)?;
    }
    assert!(buffer.is_full()?);

    for i in 0..4 {
        assert_eq!(buffer.take()?, i);
    }
    assert!(buffer.is_empty()?);

    Ok(())
}

#[test]
fn full_buffer_blocks_put() -> Result<(), Error> {
    init_logging();
    let buffer = Arc::new(BoundedBuffer::new(2)?);
    buffer.put(1)?;
    buffer.put(2)?;

    let (tx, rx) = channel();
    let t = {
        let buffer = Arc::clone(&buffer);
        std::thread::spawn(move || {
            buffer.put(3).unwrap();
            tx.send(()).unwrap();
        })
    };

    // The third put must not complete before a take.
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(buffer.size()?, 2);

    assert_eq!(buffer.take()?, 1);
    rx.recv().unwrap();
    t.join().unwrap();

    assert_eq!(buffer.size()?, 2);
    assert_eq!(buffer.contents()?, vec![2, 3]);

    Ok(())
}

#[test]
fn take_timeout() -> Result<(), Error> {
    init_logging();
    let buffer = BoundedBuffer::<u32>::new(1)?;
    assert_eq!(buffer.take_timeout(Duration::from_millis(10)), Err(Error::Timeout));
    assert_eq!(buffer.size()?, 0);

    buffer.put(7)?;
    let err = buffer
        .put_timeout(8, Duration::from_millis(10))
        .unwrap_err();
    assert_eq!(err.error(), &Error::Timeout);
    assert_eq!(err.into_inner(), 8);
    assert_eq!(buffer.contents()?, vec![7]);
    assert_eq!(buffer.take_timeout(Duration::from_millis(10))?, 7);

    Ok(())
}

#[test]
fn put_timeout_returns_item() -> Result<(), Error> {
    init_logging();
    let buffer = BoundedBuffer::new(1)?;
    buffer.put(String::from("first"))?;

    // The item can be retried without cloning it.
    let mut item = String::from("second");
    for _ in 0..2 {
        match buffer.put_timeout(item, Duration::from_millis(5)) {
            Ok(()) => panic!("buffer accepted an item while full"),
            Err(err) => {
                assert!(err.error().is_timeout());
                item = err.into_inner();
            }
        }
    }
    assert_eq!(buffer.take()?, "first");
    buffer.put(item)?;
    assert_eq!(buffer.contents()?, vec![String::from("second")]);

    Ok(())
}

#[test]
fn try_put_try_take() -> Result<(), Error> {
    init_logging();
    let buffer = BoundedBuffer::new(1)?;
    assert_eq!(buffer.try_take(), None);
    assert_eq!(buffer.try_put("a"), Ok(()));
    assert_eq!(buffer.try_put("b"), Err("b"));
    assert_eq!(buffer.try_take(), Some("a"));
    assert_eq!(buffer.capacity(), 1);

    Ok(())
}

#[test]
fn no_lost_wakeups() -> Result<(), Error> {
    init_logging();
    const PRODUCERS: usize = 3;
    const CONSUMERS: usize = 3;
    const ITEMS: usize = 200;

    let buffer = Arc::new(BoundedBuffer::new(2)?);

    // Consumers start before anything was produced.
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                let mut sum = 0;
                for _ in 0..ITEMS {
                    sum += buffer.take().unwrap();
                    assert!(buffer.size().unwrap() <= buffer.capacity());
                }
                sum
            })
        })
        .collect();

    std::thread::sleep(Duration::from_millis(10));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..ITEMS {
                    buffer.put(p * ITEMS + i).unwrap();
                }
            })
        })
        .collect();

    for t in producers {
        t.join().unwrap();
    }
    let consumed: usize = consumers.into_iter().map(|t| t.join().unwrap()).sum();

    let n = PRODUCERS * ITEMS;
    assert_eq!(consumed, n * (n - 1) / 2);
    assert_eq!(buffer.size()?, 0);

    Ok(())
}
