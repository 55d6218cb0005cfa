use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fimo_monitor::sync::{PriorityReadWriteLock, RwLockStatus};
use fimo_monitor::{Error, IllegalState};

use crate::init_logging;

fn wait_for_writers(lock: &PriorityReadWriteLock, n: usize) {
    while lock.status().unwrap().waiting_writers != n {
        std::thread::yield_now();
    }
}

#[test]
fn smoke() -> Result<(), Error> {
    init_logging();
    let l = PriorityReadWriteLock::new();
    drop(l.read()?);
    drop(l.write()?);
    drop((l.read()?, l.read()?));
    drop(l.write()?);
    assert_eq!(l.status()?, RwLockStatus::default());

    Ok(())
}

#[test]
fn concurrent_readers() -> Result<(), Error> {
    init_logging();
    let l = PriorityReadWriteLock::new();
    l.acquire_read()?;
    l.acquire_read()?;
    assert_eq!(l.status()?.active_readers, 2);
    assert!(!l.try_acquire_write());

    l.release_read()?;
    l.release_read()?;
    assert!(l.try_acquire_write());
    assert!(!l.try_acquire_read());
    l.release_write()?;

    Ok(())
}

#[test]
fn release_without_hold() {
    init_logging();
    let l = PriorityReadWriteLock::new();
    assert_eq!(
        l.release_read(),
        Err(Error::IllegalState(IllegalState::NotHeld))
    );
    assert_eq!(
        l.release_write(),
        Err(Error::IllegalState(IllegalState::NotHeld))
    );
}

#[test]
fn read_timeout_while_writing() -> Result<(), Error> {
    init_logging();
    let l = Arc::new(PriorityReadWriteLock::new());
    l.acquire_write()?;

    let res = {
        let l = Arc::clone(&l);
        std::thread::spawn(move || l.acquire_read_timeout(Duration::from_millis(10)))
            .join()
            .unwrap()
    };
    assert_eq!(res, Err(Error::Timeout));

    let status = l.status()?;
    assert_eq!(status.active_readers, 0);
    assert_eq!(status.active_writers, 1);
    l.release_write()?;

    Ok(())
}

#[test]
fn write_timeout_withdraws_request() -> Result<(), Error> {
    init_logging();
    let l = Arc::new(PriorityReadWriteLock::new());
    l.acquire_read()?;

    let (tx, rx) = channel();
    let reader = {
        let l = Arc::clone(&l);
        std::thread::spawn(move || {
            wait_for_writers(&l, 1);
            // Blocked by the pending request until it is withdrawn.
            l.acquire_read().unwrap();
            tx.send(()).unwrap();
            l.release_read().unwrap();
        })
    };

    assert_eq!(
        l.acquire_write_timeout(Duration::from_millis(200)),
        Err(Error::Timeout)
    );
    rx.recv().unwrap();
    reader.join().unwrap();

    let status = l.status()?;
    assert_eq!(status.waiting_writers, 0);
    assert_eq!(status.active_writers, 0);
    assert_eq!(status.active_readers, 1);
    l.release_read()?;

    Ok(())
}

#[test]
fn writers_are_preferred() -> Result<(), Error> {
    init_logging();
    let l = Arc::new(PriorityReadWriteLock::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    l.acquire_read()?;

    let writer = {
        let l = Arc::clone(&l);
        let events = Arc::clone(&events);
        std::thread::spawn(move || {
            l.acquire_write().unwrap();
            events.lock().unwrap().push("write");
            std::thread::sleep(Duration::from_millis(20));
            events.lock().unwrap().push("write done");
            l.release_write().unwrap();
        })
    };
    wait_for_writers(&l, 1);

    let reader = {
        let l = Arc::clone(&l);
        let events = Arc::clone(&events);
        std::thread::spawn(move || {
            l.acquire_read().unwrap();
            events.lock().unwrap().push("read");
            l.release_read().unwrap();
        })
    };

    // The late reader must not join the active one.
    std::thread::sleep(Duration::from_millis(20));
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(l.status()?.active_readers, 1);

    l.release_read()?;
    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(*events.lock().unwrap(), vec!["write", "write done", "read"]);

    Ok(())
}

#[test]
fn frob() {
    init_logging();
    const N: usize = 10;
    const M: usize = 100;

    let l = Arc::new(PriorityReadWriteLock::new());
    let readers = Arc::new(AtomicUsize::new(0));
    let writers = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..N)
        .map(|i| {
            let l = Arc::clone(&l);
            let readers = Arc::clone(&readers);
            let writers = Arc::clone(&writers);
            std::thread::spawn(move || {
                for j in 0..M {
                    if (i + j) % 5 == 0 {
                        let _guard = l.write().unwrap();
                        assert_eq!(writers.fetch_add(1, Ordering::SeqCst), 0);
                        assert_eq!(readers.load(Ordering::SeqCst), 0);
                        writers.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        let _guard = l.read().unwrap();
                        readers.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(writers.load(Ordering::SeqCst), 0);
                        readers.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for t in tasks {
        t.join().unwrap();
    }
    assert_eq!(l.status().unwrap(), RwLockStatus::default());
}
