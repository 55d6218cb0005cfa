use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

use fimo_monitor::runtime::TaskId;
use fimo_monitor::sync::Monitor;
use fimo_monitor::{Error, IllegalState};

use crate::init_logging;

#[test]
fn reentrant_run_exclusive() -> Result<(), Error> {
    init_logging();
    let m = Monitor::new(0);
    let res = m.run_exclusive(|_| m.run_exclusive(|_| Ok(())));
    assert_eq!(
        res,
        Err(Error::IllegalState(IllegalState::Reentrant(
            TaskId::current()
        )))
    );
    assert!(!m.raw_lock().is_locked());

    Ok(())
}

#[test]
fn lock_timeout_while_held() -> Result<(), Error> {
    init_logging();
    let m = Arc::new(Monitor::new(()));
    let (locked_tx, locked_rx) = channel();
    let (done_tx, done_rx) = channel::<()>();

    let holder = {
        let m = Arc::clone(&m);
        std::thread::spawn(move || {
            let _guard = m.lock().unwrap();
            locked_tx.send(()).unwrap();
            done_rx.recv().unwrap();
        })
    };

    locked_rx.recv().unwrap();
    assert!(matches!(
        m.lock_timeout(Duration::from_millis(10)),
        Err(Error::Timeout)
    ));
    assert!(m.try_lock().is_none());
    assert_eq!(m.raw_lock().queue_len(), 0);

    done_tx.send(()).unwrap();
    holder.join().unwrap();
    assert!(m.lock()?.is_held());

    Ok(())
}

#[test]
fn producer_consumer() -> Result<(), Error> {
    init_logging();
    const ITEMS: usize = 100;

    let m = Arc::new(
        Monitor::builder()
            .with_name("slot")
            .with_condition("filled")
            .with_condition("emptied")
            .build(None::<usize>),
    );

    let consumer = {
        let m = Arc::clone(&m);
        std::thread::spawn(move || {
            (0..ITEMS)
                .map(|_| {
                    m.run_exclusive(|slot| {
                        m.condition("filled")?
                            .wait_while(slot, None, |slot| slot.is_none())?;
                        let item = slot.take();
                        m.condition("emptied")?.signal();
                        Ok(item.unwrap())
                    })
                    .unwrap()
                })
                .sum::<usize>()
        })
    };

    for i in 0..ITEMS {
        m.run_exclusive(|slot| {
            m.condition("emptied")?
                .wait_while(slot, None, |slot| slot.is_some())?;
            **slot = Some(i);
            m.condition("filled")?.signal();
            Ok(())
        })?;
    }

    assert_eq!(consumer.join().unwrap(), ITEMS * (ITEMS - 1) / 2);

    Ok(())
}
