//! Forwarding of codec messages to the embedding caller.

use crate::error::HeaderError;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Receiver for codec messages, supplied by whoever embeds the bridge.
///
/// A failing handler never aborts the header read: [`Messenger`] logs the
/// failure and carries on.
pub trait MessageHandler {
    fn on_info(&self, message: &str) -> Result<(), HeaderError>;
    fn on_warning(&self, message: &str) -> Result<(), HeaderError>;
    fn on_error(&self, message: &str) -> Result<(), HeaderError>;
}

/// Handler that drops every message. Used when nobody is listening.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentHandler;

impl MessageHandler for SilentHandler {
    fn on_info(&self, _message: &str) -> Result<(), HeaderError> {
        Ok(())
    }

    fn on_warning(&self, _message: &str) -> Result<(), HeaderError> {
        Ok(())
    }

    fn on_error(&self, _message: &str) -> Result<(), HeaderError> {
        Ok(())
    }
}

/// Handler that turns messages into `tracing` events under the `codec` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHandler;

impl MessageHandler for TracingHandler {
    fn on_info(&self, message: &str) -> Result<(), HeaderError> {
        tracing::info!(target: "codec", "{message}");
        Ok(())
    }

    fn on_warning(&self, message: &str) -> Result<(), HeaderError> {
        warn!(target: "codec", "{message}");
        Ok(())
    }

    fn on_error(&self, message: &str) -> Result<(), HeaderError> {
        error!(target: "codec", "{message}");
        Ok(())
    }
}

/// Handler that keeps every message, in order.
#[derive(Debug, Default)]
pub struct CollectingHandler {
    messages: RefCell<Vec<(MessageLevel, String)>>,
}

impl CollectingHandler {
    pub fn messages(&self) -> Vec<(MessageLevel, String)> {
        self.messages.borrow().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|(level, _)| *level == MessageLevel::Error)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn push(&self, level: MessageLevel, message: &str) -> Result<(), HeaderError> {
        self.messages.borrow_mut().push((level, message.to_owned()));
        Ok(())
    }
}

impl MessageHandler for CollectingHandler {
    fn on_info(&self, message: &str) -> Result<(), HeaderError> {
        self.push(MessageLevel::Info, message)
    }

    fn on_warning(&self, message: &str) -> Result<(), HeaderError> {
        self.push(MessageLevel::Warning, message)
    }

    fn on_error(&self, message: &str) -> Result<(), HeaderError> {
        self.push(MessageLevel::Error, message)
    }
}

/// Callback context shared between the bridge and the codec for one call.
#[derive(Clone)]
pub struct Messenger {
    handler: Rc<dyn MessageHandler>,
}

impl Messenger {
    pub fn new(handler: Rc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    pub fn silent() -> Self {
        Self::new(Rc::new(SilentHandler))
    }

    pub fn info(&self, message: &str) {
        self.deliver(MessageLevel::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.deliver(MessageLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.deliver(MessageLevel::Error, message);
    }

    pub fn deliver(&self, level: MessageLevel, message: &str) {
        let message = message.trim_end();
        debug!(?level, message, "codec message");
        let result = match level {
            MessageLevel::Info => self.handler.on_info(message),
            MessageLevel::Warning => self.handler.on_warning(message),
            MessageLevel::Error => self.handler.on_error(message),
        };
        if let Err(err) = result {
            error!(?level, %err, "exception during call back method");
        }
    }

    /// Reports an error that ends the current call.
    pub fn report_failure(&self, err: HeaderError) {
        warn!(code = err.code(), %err, "header read failed");
        self.error(&err.to_string());
    }
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FailingHandler {
        calls: Cell<u32>,
    }

    impl MessageHandler for FailingHandler {
        fn on_info(&self, _message: &str) -> Result<(), HeaderError> {
            self.calls.set(self.calls.get() + 1);
            Err(HeaderError::JavaException)
        }

        fn on_warning(&self, _message: &str) -> Result<(), HeaderError> {
            self.calls.set(self.calls.get() + 1);
            Err(HeaderError::JavaException)
        }

        fn on_error(&self, _message: &str) -> Result<(), HeaderError> {
            self.calls.set(self.calls.get() + 1);
            Err(HeaderError::CallbackFailed)
        }
    }

    #[test]
    fn test_failures_are_swallowed() {
        let handler = Rc::new(FailingHandler { calls: Cell::new(0) });
        let messenger = Messenger::new(handler.clone());
        messenger.info("a");
        messenger.warning("b");
        messenger.error("c");
        messenger.info("d");
        assert_eq!(handler.calls.get(), 4);
    }

    #[test]
    fn test_levels_are_routed() {
        let handler = Rc::new(CollectingHandler::default());
        let messenger = Messenger::new(handler.clone());
        messenger.info("Start to read j2k main header\n");
        messenger.error("Expected a SOC marker");
        assert_eq!(
            handler.messages(),
            vec![
                (MessageLevel::Info, "Start to read j2k main header".to_owned()),
                (MessageLevel::Error, "Expected a SOC marker".to_owned()),
            ]
        );
        assert_eq!(handler.errors(), vec!["Expected a SOC marker".to_owned()]);
    }
}
