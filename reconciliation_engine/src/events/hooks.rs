use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, SettlementEvent, UserChangedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub settlement_producer: Vec<EventProducer<SettlementEvent>>,
    pub user_changed_producer: Vec<EventProducer<UserChangedEvent>>,
}

pub struct EventHandlers {
    pub on_settlement: Option<EventHandler<SettlementEvent>>,
    pub on_user_changed: Option<EventHandler<UserChangedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_settlement = hooks.on_settlement.map(|f| EventHandler::new(buffer_size, f));
        let on_user_changed = hooks.on_user_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_settlement, on_user_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_settlement {
            result.settlement_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_user_changed {
            result.user_changed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_settlement {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_user_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_settlement: Option<Handler<SettlementEvent>>,
    pub on_user_changed: Option<Handler<UserChangedEvent>>,
}

impl EventHooks {
    pub fn on_settlement<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SettlementEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_settlement = Some(Arc::new(f));
        self
    }

    pub fn on_user_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(UserChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_user_changed = Some(Arc::new(f));
        self
    }
}
