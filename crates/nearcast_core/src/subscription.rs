use crate::activity::UserFilter;
use crate::cell::Cell;
use crate::context::Context;
use crate::store::ClientChannel;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Events consumed by a subscription driver, in FIFO order.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    /// The entity crossed a cell boundary; the snapshot carries the new
    /// cell and its covering by value.
    CellChange(Cell),
    /// The client switched between the local and a group filter.
    FilterChange(UserFilter),
    /// End the driver and release every subscription of the connection.
    Stop,
}

/// Queue depth for one driver. Producers never block: an event that does
/// not fit is dropped, which is sound because only the latest cell matters
/// and filter changes are idempotent.
const EVENT_QUEUE_DEPTH: usize = 16;

/// The per-connection serialization point: a single consumer task that
/// turns cell-change and filter-change events into broker resubscriptions
/// for one client channel.
pub struct Subscription {
    ctx: Arc<dyn Context>,
    tx: mpsc::Sender<SubscriptionEvent>,
    rx: Mutex<Option<mpsc::Receiver<SubscriptionEvent>>>,
    stopping: Arc<AtomicBool>,
    dropped: AtomicU64,
}

impl Subscription {
    pub fn new(ctx: Arc<dyn Context>) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        Subscription {
            ctx,
            tx,
            rx: Mutex::new(Some(rx)),
            stopping: Arc::new(AtomicBool::new(false)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Start the driver task against `conn`. The first call wins; later
    /// calls return `None`.
    pub fn start(&self, conn: Arc<dyn ClientChannel>) -> Option<tokio::task::JoinHandle<()>> {
        let rx = self.rx.lock().unwrap().take()?;
        let ctx = self.ctx.clone();
        let stopping = self.stopping.clone();
        Some(tokio::spawn(drive(ctx, conn, rx, stopping)))
    }

    /// Hand the driver a cell snapshot. Non-blocking.
    pub fn set_cell(&self, cell: Cell) {
        self.enqueue(SubscriptionEvent::CellChange(cell));
    }

    /// Hand the driver a filter change. Non-blocking.
    pub fn set_user_filter(&self, filter: UserFilter) {
        self.enqueue(SubscriptionEvent::FilterChange(filter));
    }

    /// Ask the driver to finish. Safe to call more than once; the driver
    /// terminates even if the queue is full at this moment.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        let _ = self.tx.try_send(SubscriptionEvent::Stop);
    }

    /// Events discarded because the driver was slow or stopped.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, event: SubscriptionEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("subscription queue full, event dropped");
        }
    }
}

/// The driver loop. Runs until a `Stop` event or the stopping flag is
/// observed, then releases the connection from both planes. The flag covers
/// the case where `Stop` itself could not be enqueued.
async fn drive(
    ctx: Arc<dyn Context>,
    conn: Arc<dyn ClientChannel>,
    mut rx: mpsc::Receiver<SubscriptionEvent>,
    stopping: Arc<AtomicBool>,
) {
    let mut current_filter = UserFilter::local();
    let mut last_cell: Option<Cell> = None;
    let mut done = false;

    while !done && !stopping.load(Ordering::Acquire) {
        let Some(mut event) = rx.recv().await else {
            break;
        };

        // Coalesce bursts of cell changes: only the newest covering is
        // worth a resubscription. A trailing non-cell event is kept and
        // handled in order.
        let mut follow_up = None;
        if matches!(event, SubscriptionEvent::CellChange(_)) {
            while let Ok(next) = rx.try_recv() {
                if matches!(next, SubscriptionEvent::CellChange(_)) {
                    event = next;
                } else {
                    follow_up = Some(next);
                    break;
                }
            }
        }

        for event in [Some(event), follow_up].into_iter().flatten() {
            match event {
                SubscriptionEvent::CellChange(cell) => {
                    if current_filter.is_local() {
                        if let Err(e) = ctx.subscribe_to_cell(&conn, &cell).await {
                            warn!("cell resubscription failed: {e}");
                        }
                    }
                    last_cell = Some(cell);
                }
                SubscriptionEvent::FilterChange(filter) => {
                    if filter != current_filter {
                        if filter.is_group() {
                            if let Err(e) = ctx.subscribe_to_group(&conn, &filter.value).await {
                                warn!("group subscription failed: {e}");
                            }
                        } else if filter.is_local() {
                            if let Some(cell) = &last_cell {
                                if let Err(e) = ctx.subscribe_to_cell(&conn, cell).await {
                                    warn!("cell resubscription failed: {e}");
                                }
                            }
                        }
                        current_filter = filter;
                    }
                }
                SubscriptionEvent::Stop => {
                    done = true;
                    break;
                }
            }
        }
    }

    if let Err(e) = ctx.unsubscribe(&conn).await {
        debug!("teardown unsubscribe failed: {e}");
    }
}
