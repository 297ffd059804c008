//! # Events — Structured Event Bus for Price Activity
//!
//! A bounded, thread-safe event log that collects structured events from the
//! ingestion path and the batch price check and turns them into notifications
//! for connected dashboards.
//!
//! ## Event Types
//!
//! | Variant | Emitted When |
//! |---------|-------------|
//! | `ProductAdded` | An owner starts tracking a new URL |
//! | `ProductUpdated` | An owner resubmits a URL they already track |
//! | `ProductDeleted` | An owner stops tracking a product |
//! | `PriceDropped` | The batch check sees a lower price (buffered, squashed on flush) |
//! | `BatchCompleted` | A batch price check finishes (with its report counters) |
//! | `ViewRefresh` | An owner's product list changed and open views should reload |
//! | `Warning` | Non-fatal issues (e.g., alert delivery failed) |
//! | `Error` | A batch run could not start |
//!
//! ## Delivery
//!
//! Events are stored in a `VecDeque` (bounded to prevent unbounded growth)
//! and converted to `Notification` structs for WebSocket delivery. Each
//! notification gets a monotonic `id` for deduplication. View refreshes skip
//! the notification feed and go straight to WebSocket subscribers as
//! `{"type":"refresh"}` messages.
//!
//! ## Visibility
//!
//! Every record, notification and broadcast carries an [`Audience`]. Product
//! activity belongs to its owner; batch summaries, warnings and errors are
//! operator-only. Readers pass a [`Viewer`] and only get what it may see.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ingest::ViewRefresh;

/// Events emitted by the ingestion path and the batch runner.
#[derive(Clone, Debug)]
pub enum Event {
    ProductAdded {
        owner: Uuid,
        name: String,
        price: Decimal,
        currency: String,
    },
    ProductUpdated {
        owner: Uuid,
        name: String,
        price: Decimal,
        currency: String,
        price_changed: bool,
    },
    ProductDeleted {
        owner: Uuid,
        product_id: Uuid,
    },
    PriceDropped {
        owner: Uuid,
        name: String,
        currency: String,
        old_price: Decimal,
        new_price: Decimal,
    },
    BatchCompleted {
        total: usize,
        updated: usize,
        failed: usize,
        price_changes: usize,
        alerts_sent: usize,
        elapsed_secs: f64,
    },
    ViewRefresh {
        owner: Option<Uuid>,
    },
    Warning {
        context: String,
        message: String,
    },
    Error {
        context: String,
        message: String,
    },
}

/// Who an event, notification or broadcast is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    Owner(Uuid),
    Operator,
}

/// Who is reading. The operator sees everything; an owner sees only their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Viewer {
    Owner(Uuid),
    Operator,
}

impl Audience {
    fn of(owner: Option<Uuid>) -> Self {
        owner.map_or(Audience::Operator, Audience::Owner)
    }

    pub fn visible_to(self, viewer: Viewer) -> bool {
        match viewer {
            Viewer::Operator => true,
            Viewer::Owner(id) => self == Audience::Owner(id),
        }
    }
}

/// One serialized WebSocket message and who may receive it.
#[derive(Clone, Debug)]
pub struct WsMessage {
    pub audience: Audience,
    pub json: String,
}

/// A squashed notification ready for delivery to the frontend.
#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    #[serde(skip)]
    pub audience: Audience,
    pub id: u64,
    pub kind: String,
    pub title: String,
    pub details: Vec<String>,
    pub count: u32,
    pub timestamp_ms: u64,
}

/// Central event bus: the core emits events, the bus handles logging,
/// buffering, squashing, and broadcasting notifications via WebSocket.
pub struct EventBus {
    recent: Mutex<VecDeque<EventRecord>>,
    pending_drops: Mutex<Vec<PendingDrop>>,
    last_flush: Mutex<Instant>,
    notifications: Mutex<VecDeque<Notification>>,
    next_id: AtomicU64,
    ws_sender: broadcast::Sender<WsMessage>,
    start: Instant,
}

#[derive(Clone, Debug, Serialize)]
pub struct EventRecord {
    #[serde(skip)]
    pub audience: Audience,
    pub kind: String,
    pub message: String,
    pub elapsed_secs: f64,
}

#[derive(Clone, Debug)]
struct PendingDrop {
    owner: Uuid,
    name: String,
    currency: String,
    old_price: Decimal,
    new_price: Decimal,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

const RECENT_EVENTS_CAP: usize = 200;
const NOTIFICATIONS_CAP: usize = 50;
const FLUSH_INTERVAL_SECS: u64 = 10;
const WS_CHANNEL_CAP: usize = 256;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (ws_sender, _) = broadcast::channel(WS_CHANNEL_CAP);
        EventBus {
            recent: Mutex::new(VecDeque::with_capacity(RECENT_EVENTS_CAP)),
            pending_drops: Mutex::new(Vec::new()),
            last_flush: Mutex::new(Instant::now()),
            notifications: Mutex::new(VecDeque::with_capacity(NOTIFICATIONS_CAP)),
            next_id: AtomicU64::new(1),
            ws_sender,
            start: Instant::now(),
        }
    }

    /// Subscribe to broadcasts (one receiver per WS client).
    pub fn subscribe_ws(&self) -> broadcast::Receiver<WsMessage> {
        self.ws_sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        let elapsed = self.start.elapsed().as_secs_f64();

        // Product lifecycle events are logged by the ingest path.
        match &event {
            Event::ProductAdded {
                owner,
                name,
                price,
                currency,
            } => {
                let audience = Audience::Owner(*owner);
                self.push_record(
                    audience,
                    "product_added",
                    &format!("{} at {} {}", name, currency, price),
                    elapsed,
                );
                self.broadcast_notification(Notification {
                    audience,
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    kind: "product_added".into(),
                    title: format!("Now tracking {}", name),
                    details: vec![format!("Current price {} {}", currency, price)],
                    count: 1,
                    timestamp_ms: now_ms(),
                });
            }
            Event::ProductUpdated {
                owner,
                name,
                price,
                currency,
                price_changed,
            } => {
                self.push_record(
                    Audience::Owner(*owner),
                    "product_updated",
                    &format!("{} at {} {} (changed={})", name, currency, price, price_changed),
                    elapsed,
                );
            }
            Event::ProductDeleted { owner, product_id } => {
                self.push_record(
                    Audience::Owner(*owner),
                    "product_deleted",
                    &product_id.to_string(),
                    elapsed,
                );
            }
            Event::PriceDropped {
                owner,
                name,
                currency,
                old_price,
                new_price,
            } => {
                info!(owner = %owner, product = %name, old_price = %old_price, new_price = %new_price, "price drop");
                self.push_record(
                    Audience::Owner(*owner),
                    "price_drop",
                    &format!("{} {} {} -> {}", name, currency, old_price, new_price),
                    elapsed,
                );
                self.pending_drops.lock().unwrap().push(PendingDrop {
                    owner: *owner,
                    name: name.clone(),
                    currency: currency.clone(),
                    old_price: *old_price,
                    new_price: *new_price,
                });
            }
            Event::BatchCompleted {
                total,
                updated,
                failed,
                price_changes,
                alerts_sent,
                elapsed_secs,
            } => {
                self.push_record(
                    Audience::Operator,
                    "batch_done",
                    &format!(
                        "total={} updated={} failed={} changes={} alerts={}",
                        total, updated, failed, price_changes, alerts_sent
                    ),
                    elapsed,
                );
                // Drops from this run go out before the summary.
                self.flush();
                self.broadcast_notification(Notification {
                    audience: Audience::Operator,
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    kind: "batch_done".into(),
                    title: "Price check complete".into(),
                    details: vec![format!(
                        "Checked {} products: {} updated, {} failed, {} price changes, {} alerts sent in {:.1}s",
                        total, updated, failed, price_changes, alerts_sent, elapsed_secs
                    )],
                    count: 1,
                    timestamp_ms: now_ms(),
                });
            }
            Event::ViewRefresh { owner } => {
                let audience = Audience::of(*owner);
                let scope = owner.map_or_else(|| "anonymous".to_string(), |o| o.to_string());
                self.push_record(audience, "refresh", &scope, elapsed);
                self.broadcast(audience, serde_json::json!({ "type": "refresh" }));
            }
            Event::Warning { context, message } => {
                warn!(context = %context, "{}", message);
                self.push_record(
                    Audience::Operator,
                    "warning",
                    &format!("[{}] {}", context, message),
                    elapsed,
                );
            }
            Event::Error { context, message } => {
                tracing::error!(context = %context, "{}", message);
                self.push_record(
                    Audience::Operator,
                    "error",
                    &format!("[{}] {}", context, message),
                    elapsed,
                );
                self.broadcast_notification(Notification {
                    audience: Audience::Operator,
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    kind: "error".into(),
                    title: format!("Error: {}", context),
                    details: vec![message.clone()],
                    count: 1,
                    timestamp_ms: now_ms(),
                });
            }
        }

        let should_flush = {
            let last = self.last_flush.lock().unwrap();
            last.elapsed().as_secs() >= FLUSH_INTERVAL_SECS
        };
        if should_flush {
            self.flush();
        }
    }

    /// Flush pending price drops: squash per owner and currency, then broadcast.
    pub fn flush(&self) {
        let drops: Vec<PendingDrop> = {
            let mut pending = self.pending_drops.lock().unwrap();
            std::mem::take(&mut *pending)
        };
        *self.last_flush.lock().unwrap() = Instant::now();

        if drops.is_empty() {
            return;
        }

        let mut groups: BTreeMap<(Uuid, String), Vec<PendingDrop>> = BTreeMap::new();
        for d in drops {
            groups
                .entry((d.owner, d.currency.clone()))
                .or_default()
                .push(d);
        }

        for ((owner, currency), items) in &groups {
            let count = items.len() as u32;
            let title = if count == 1 {
                format!("Price drop: {}", items[0].name)
            } else {
                format!("{} price drops ({})", count, currency)
            };

            let max_details = 5;
            let mut details: Vec<String> = items
                .iter()
                .take(max_details)
                .map(|d| format!("{}: {} {} -> {}", d.name, d.currency, d.old_price, d.new_price))
                .collect();
            if items.len() > max_details {
                details.push(format!("and {} more", items.len() - max_details));
            }

            self.broadcast_notification(Notification {
                audience: Audience::Owner(*owner),
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                kind: "price_drop".into(),
                title,
                details,
                count,
                timestamp_ms: now_ms(),
            });
        }
    }

    /// Recent notifications `viewer` may see, newest first.
    pub fn recent_notifications(&self, viewer: Viewer, limit: usize) -> Vec<Notification> {
        let notifs = self.notifications.lock().unwrap();
        notifs
            .iter()
            .rev()
            .filter(|n| n.audience.visible_to(viewer))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Recent events `viewer` may see, newest first.
    pub fn recent_events(&self, viewer: Viewer, limit: usize) -> Vec<EventRecord> {
        let events = self.recent.lock().unwrap();
        events
            .iter()
            .rev()
            .filter(|e| e.audience.visible_to(viewer))
            .take(limit)
            .cloned()
            .collect()
    }

    fn push_record(&self, audience: Audience, kind: &str, message: &str, elapsed: f64) {
        let mut recent = self.recent.lock().unwrap();
        if recent.len() >= RECENT_EVENTS_CAP {
            recent.pop_front();
        }
        recent.push_back(EventRecord {
            audience,
            kind: kind.into(),
            message: message.into(),
            elapsed_secs: elapsed,
        });
    }

    fn broadcast_notification(&self, notification: Notification) {
        {
            let mut notifs = self.notifications.lock().unwrap();
            if notifs.len() >= NOTIFICATIONS_CAP {
                notifs.pop_front();
            }
            notifs.push_back(notification.clone());
        }
        self.broadcast(
            notification.audience,
            serde_json::json!({
                "type": "notification",
                "notification": notification,
            }),
        );
    }

    fn broadcast(&self, audience: Audience, message: serde_json::Value) {
        // No subscribers is not an error.
        let _ = self.ws_sender.send(WsMessage {
            audience,
            json: message.to_string(),
        });
    }
}

impl ViewRefresh for EventBus {
    fn refresh_view(&self, owner: Option<Uuid>) {
        self.emit(Event::ViewRefresh { owner });
    }
}
