//! Derived cells
//!
//! A derived cell is a `watch` channel whose value is recomputed by a spawned
//! task whenever one of its inputs changes. Downstream receivers are only
//! notified when the computed value actually differs. The task ends when all
//! inputs are closed or all downstream receivers are dropped.

use tokio::sync::watch;

/// Cell holding `f(source)`
pub fn map<A, B, F>(mut source: watch::Receiver<A>, f: F) -> watch::Receiver<B>
where
    A: Send + Sync + 'static,
    B: PartialEq + Send + Sync + 'static,
    F: Fn(&A) -> B + Send + 'static,
{
    let initial = f(&source.borrow_and_update());
    let (tx, rx) = watch::channel(initial);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = source.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = f(&source.borrow_and_update());
                    publish(&tx, next);
                }
                _ = tx.closed() => break,
            }
        }
    });

    rx
}

/// Cell holding `f(a, b)`
pub fn combine<A, B, C, F>(
    mut a: watch::Receiver<A>,
    mut b: watch::Receiver<B>,
    f: F,
) -> watch::Receiver<C>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    C: PartialEq + Send + Sync + 'static,
    F: Fn(&A, &B) -> C + Send + 'static,
{
    let initial = f(&a.borrow_and_update(), &b.borrow_and_update());
    let (tx, rx) = watch::channel(initial);

    tokio::spawn(async move {
        let mut a_open = true;
        let mut b_open = true;

        while a_open || b_open {
            tokio::select! {
                changed = a.changed(), if a_open => {
                    if changed.is_err() {
                        a_open = false;
                        continue;
                    }
                }
                changed = b.changed(), if b_open => {
                    if changed.is_err() {
                        b_open = false;
                        continue;
                    }
                }
                _ = tx.closed() => break,
            }

            let next = f(&a.borrow_and_update(), &b.borrow_and_update());
            publish(&tx, next);
        }
    });

    rx
}

fn publish<T: PartialEq>(tx: &watch::Sender<T>, next: T) {
    tx.send_if_modified(|current| {
        if *current != next {
            *current = next;
            true
        } else {
            false
        }
    });
}
