pub mod view;

pub use view::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::{Agent, AgentFactory};
use crate::config::{Credentials, RiskLevel, Settings, SettingsForm};
use crate::error::{PanelError, PanelResult};

/// Everything that survives between renders for one operator: the agent
/// handle (if one has been built), the pending settings used for the next
/// construction, and the session credentials.
pub struct Session {
    pub agent: Option<Box<dyn Agent>>,
    pub settings: Settings,
    pub credentials: Credentials,
}

impl Session {
    pub fn new(settings: Settings, credentials: Credentials) -> Self {
        Self {
            agent: None,
            settings,
            credentials,
        }
    }

    pub fn is_running(&self) -> bool {
        self.agent.as_ref().is_some_and(|agent| agent.is_running())
    }

    pub fn controls(&self) -> ControlState {
        ControlState::for_agent(self.agent.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub restart_enabled: bool,
}

impl ControlState {
    pub fn for_agent(agent: Option<&dyn Agent>) -> Self {
        let running = agent.is_some_and(|agent| agent.is_running());
        Self {
            start_enabled: !running,
            stop_enabled: running,
            restart_enabled: agent.is_some(),
        }
    }
}

/// Inline message shown next to the control that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum Notice {
    Success(String),
    Info(String),
    Warning(String),
    Error(String),
}

impl Notice {
    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Notice::Success(m) | Notice::Info(m) | Notice::Warning(m) | Notice::Error(m) => m,
        }
    }

    fn from_result(result: PanelResult<Notice>) -> Self {
        result.unwrap_or_else(|e| {
            warn!("{}", e);
            Notice::Error(e.to_string())
        })
    }
}

/// Operator preferences collected outside the numeric settings form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Case-insensitive risk level name; `neutral` is accepted for Balanced.
    pub risk_level: Option<String>,
    pub model: Option<String>,
    pub target_coins: Option<Vec<String>>,
}

/// Translates operator intents into agent lifecycle calls. Holds no
/// session state of its own; every operation takes the session explicitly.
#[derive(Clone)]
pub struct ControlPanel {
    factory: Arc<dyn AgentFactory>,
}

impl ControlPanel {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self { factory }
    }

    pub async fn start(&self, session: &mut Session) -> Notice {
        Notice::from_result(self.try_start(session).await)
    }

    pub async fn stop(&self, session: &mut Session) -> Notice {
        Notice::from_result(self.try_stop(session).await)
    }

    pub async fn restart(&self, session: &mut Session) -> Notice {
        Notice::from_result(self.try_restart(session).await)
    }

    pub async fn apply_settings(&self, session: &mut Session, form: &SettingsForm) -> Notice {
        Notice::from_result(self.try_apply_settings(session, form).await)
    }

    pub fn set_credentials(&self, session: &mut Session, credentials: Credentials) -> Notice {
        session.credentials.merge(credentials);
        info!("Session credentials updated: {:?}", session.credentials);

        if session.credentials.is_complete() {
            Notice::Success("API keys have been saved.".to_string())
        } else {
            Notice::Warning("API keys saved, but some required keys are still missing.".to_string())
        }
    }

    pub fn set_preferences(&self, session: &mut Session, preferences: Preferences) -> Notice {
        let mut pending = session.settings.clone();
        if let Some(risk) = preferences.risk_level {
            match RiskLevel::from_str(&risk) {
                Some(level) => pending.risk_level = level,
                None => return Notice::Error(format!("Unknown risk level: {}", risk)),
            }
        }
        if let Some(model) = preferences.model {
            pending.model = model.trim().to_string();
        }
        if let Some(coins) = preferences.target_coins {
            pending.target_coins = coins.iter().map(|c| c.trim().to_uppercase()).collect();
        }

        if let Err(errors) = pending.validate() {
            return Notice::Error(format!("Invalid preferences: {}", errors.join(", ")));
        }

        session.settings = pending;
        Notice::Info("Preferences saved. Apply settings or restart the agent to use them.".to_string())
    }

    fn create_agent(&self, session: &Session) -> PanelResult<Box<dyn Agent>> {
        self.factory
            .create(&session.credentials, &session.settings)
            .map_err(PanelError::AgentConstruction)
    }

    async fn try_start(&self, session: &mut Session) -> PanelResult<Notice> {
        if session.is_running() {
            return Err(PanelError::ActionUnavailable {
                action: "Start",
                state: "running",
            });
        }
        if !session.credentials.has_exchange_keys() {
            return Err(PanelError::MissingExchangeKeys);
        }
        if !session.credentials.has_model_key() {
            return Err(PanelError::MissingModelKey);
        }

        let agent = match session.agent.take() {
            Some(agent) => agent,
            None => self.create_agent(session)?,
        };
        let agent = session.agent.insert(agent);

        if agent.start().await {
            info!("Agent started");
            Ok(Notice::Success("Agent has been started!".to_string()))
        } else {
            Err(PanelError::AgentOperation("start"))
        }
    }

    async fn try_stop(&self, session: &mut Session) -> PanelResult<Notice> {
        let agent = match session.agent.as_ref() {
            Some(agent) if agent.is_running() => agent,
            Some(_) => {
                return Err(PanelError::ActionUnavailable {
                    action: "Stop",
                    state: "stopped",
                })
            }
            None => {
                return Err(PanelError::ActionUnavailable {
                    action: "Stop",
                    state: "not initialized",
                })
            }
        };

        if agent.stop().await {
            info!("Agent stopped");
            Ok(Notice::Success("Agent has been stopped!".to_string()))
        } else {
            Err(PanelError::AgentOperation("stop"))
        }
    }

    async fn try_restart(&self, session: &mut Session) -> PanelResult<Notice> {
        let Some(previous) = session.agent.as_ref() else {
            return Err(PanelError::ActionUnavailable {
                action: "Restart",
                state: "not initialized",
            });
        };

        if previous.is_running() && !previous.stop().await {
            warn!("Previous agent reported a failed stop; discarding it anyway");
        }

        let fresh = self.create_agent(session)?;
        // Anything the previous agent still buffered is lost here.
        let agent = session.agent.insert(fresh);
        info!("Previous agent discarded, starting a fresh one");

        if agent.start().await {
            Ok(Notice::Success("Agent has been restarted!".to_string()))
        } else {
            Err(PanelError::AgentOperation("restart"))
        }
    }

    async fn try_apply_settings(&self, session: &mut Session, form: &SettingsForm) -> PanelResult<Notice> {
        let operation = form.parse()?;

        let Some(agent) = session.agent.as_ref() else {
            session.settings.apply_operation(operation);
            return Ok(Notice::Info(
                "Settings have been saved. They will be applied when the agent starts.".to_string(),
            ));
        };

        agent
            .update_operation_settings(
                Some(operation.interval_minutes),
                Some(operation.max_investment),
                Some(operation.max_trading_count),
            )
            .await;

        session.settings.apply_operation(operation);
        let restart_required = agent.update_settings(session.settings.to_update()).await;

        if restart_required && agent.is_running() {
            Ok(Notice::Warning(
                "Some setting changes require agent restart. Please stop and start again.".to_string(),
            ))
        } else {
            Ok(Notice::Success("Settings have been applied!".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{MockAgent, MockAgentFactory};
    use mockall::predicate::eq;
    use std::sync::Mutex;

    fn credentials() -> Credentials {
        Credentials::new("access", "secret", "sk-model")
    }

    fn session() -> Session {
        Session::new(Settings::default(), credentials())
    }

    fn panel(factory: MockAgentFactory) -> ControlPanel {
        ControlPanel::new(Arc::new(factory))
    }

    fn idle_agent(running: bool) -> MockAgent {
        let mut agent = MockAgent::new();
        agent.expect_is_running().return_const(running);
        agent
    }

    fn form(interval: &str, count: &str, investment: &str) -> SettingsForm {
        SettingsForm {
            interval_minutes: interval.to_string(),
            max_trading_count: count.to_string(),
            max_investment: investment.to_string(),
        }
    }

    #[test]
    fn test_control_state() {
        let none = ControlState::for_agent(None);
        assert!(none.start_enabled);
        assert!(!none.stop_enabled);
        assert!(!none.restart_enabled);

        let running = idle_agent(true);
        let state = ControlState::for_agent(Some(&running));
        assert!(!state.start_enabled);
        assert!(state.stop_enabled);
        assert!(state.restart_enabled);

        let stopped = idle_agent(false);
        let state = ControlState::for_agent(Some(&stopped));
        assert!(state.start_enabled);
        assert!(!state.stop_enabled);
        assert!(state.restart_enabled);
    }

    #[tokio::test]
    async fn test_start_requires_exchange_keys() {
        let panel = panel(MockAgentFactory::new());
        let mut session = Session::new(Settings::default(), Credentials::new("", "secret", "sk-model"));

        let notice = panel.start(&mut session).await;
        assert!(notice.is_error());
        assert!(notice.message().contains("Exchange API keys"));
        assert!(session.agent.is_none());
    }

    #[tokio::test]
    async fn test_start_requires_model_key() {
        let panel = panel(MockAgentFactory::new());
        let mut session = Session::new(Settings::default(), Credentials::new("access", "secret", ""));

        let notice = panel.start(&mut session).await;
        assert!(notice.message().contains("Model API key"));
        assert!(session.agent.is_none());
    }

    #[tokio::test]
    async fn test_start_constructs_lazily() {
        let mut agent = idle_agent(false);
        agent.expect_start().times(1).returning(|| true);

        let mut factory = MockAgentFactory::new();
        factory
            .expect_create()
            .withf(|creds, settings| creds.is_complete() && settings.interval_minutes == 5)
            .times(1)
            .return_once(move |_, _| Ok(Box::new(agent)));

        let panel = panel(factory);
        let mut session = session();

        let notice = panel.start(&mut session).await;
        assert_eq!(notice, Notice::Success("Agent has been started!".to_string()));
        assert!(session.agent.is_some());
    }

    #[tokio::test]
    async fn test_start_reuses_existing_agent() {
        let mut agent = idle_agent(false);
        agent.expect_start().times(1).returning(|| false);

        let panel = panel(MockAgentFactory::new());
        let mut session = session();
        session.agent = Some(Box::new(agent));

        let notice = panel.start(&mut session).await;
        assert_eq!(notice, Notice::Error("Failed to start the agent.".to_string()));
        assert!(session.agent.is_some());
    }

    #[tokio::test]
    async fn test_start_unavailable_while_running() {
        let panel = panel(MockAgentFactory::new());
        let mut session = session();
        session.agent = Some(Box::new(idle_agent(true)));

        let notice = panel.start(&mut session).await;
        assert!(notice.is_error());
    }

    #[tokio::test]
    async fn test_start_reports_construction_failure() {
        let mut factory = MockAgentFactory::new();
        factory
            .expect_create()
            .times(1)
            .return_once(|_, _| Err(anyhow::anyhow!("bad settings")));

        let panel = panel(factory);
        let mut session = session();

        let notice = panel.start(&mut session).await;
        assert!(notice.message().contains("bad settings"));
        assert!(session.agent.is_none());
    }

    #[tokio::test]
    async fn test_stop_only_when_running() {
        let panel = panel(MockAgentFactory::new());
        let mut session = session();

        assert!(panel.stop(&mut session).await.is_error());

        session.agent = Some(Box::new(idle_agent(false)));
        assert!(panel.stop(&mut session).await.is_error());

        let mut running = idle_agent(true);
        running.expect_stop().times(1).returning(|| true);
        session.agent = Some(Box::new(running));
        assert_eq!(
            panel.stop(&mut session).await,
            Notice::Success("Agent has been stopped!".to_string())
        );
    }

    #[tokio::test]
    async fn test_restart_requires_agent() {
        let panel = panel(MockAgentFactory::new());
        let mut session = session();
        assert!(panel.restart(&mut session).await.is_error());
    }

    #[tokio::test]
    async fn test_restart_stops_then_rebuilds() {
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut previous = idle_agent(true);
        let log = Arc::clone(&events);
        previous.expect_stop().times(1).returning(move || {
            log.lock().unwrap().push("stop");
            false
        });

        let mut fresh = idle_agent(true);
        let log = Arc::clone(&events);
        fresh.expect_start().times(1).returning(move || {
            log.lock().unwrap().push("start");
            true
        });

        let mut factory = MockAgentFactory::new();
        let log = Arc::clone(&events);
        factory.expect_create().times(1).return_once(move |_, _| {
            log.lock().unwrap().push("create");
            Ok(Box::new(fresh))
        });

        let panel = panel(factory);
        let mut session = session();
        session.agent = Some(Box::new(previous));

        let notice = panel.restart(&mut session).await;
        assert_eq!(notice, Notice::Success("Agent has been restarted!".to_string()));
        assert_eq!(*events.lock().unwrap(), vec!["stop", "create", "start"]);
    }

    #[tokio::test]
    async fn test_restart_of_stopped_agent_skips_stop() {
        let mut fresh = idle_agent(false);
        fresh.expect_start().times(1).returning(|| false);

        let mut factory = MockAgentFactory::new();
        factory
            .expect_create()
            .times(1)
            .return_once(move |_, _| Ok(Box::new(fresh)));

        let panel = panel(factory);
        let mut session = session();
        session.agent = Some(Box::new(idle_agent(false)));

        let notice = panel.restart(&mut session).await;
        assert_eq!(notice, Notice::Error("Failed to restart the agent.".to_string()));
    }

    #[tokio::test]
    async fn test_apply_settings_forwards_values() {
        let mut agent = idle_agent(true);
        agent
            .expect_update_operation_settings()
            .with(eq(Some(5)), eq(Some(100_000)), eq(Some(3)))
            .times(1)
            .return_const(());
        agent
            .expect_update_settings()
            .withf(|update| {
                update.interval_minutes == Some(5)
                    && update.max_investment == Some(100_000)
                    && update.max_trading_count == Some(3)
                    && update.risk_level == Some(RiskLevel::Balanced)
                    && update.model.as_deref() == Some("gpt-4o-mini")
            })
            .times(1)
            .returning(|_| false);

        let panel = panel(MockAgentFactory::new());
        let mut session = session();
        session.settings.interval_minutes = 10;
        session.agent = Some(Box::new(agent));

        let notice = panel.apply_settings(&mut session, &form("5", "3", "100000")).await;
        assert_eq!(notice, Notice::Success("Settings have been applied!".to_string()));
        assert_eq!(session.settings.interval_minutes, 5);
    }

    #[tokio::test]
    async fn test_apply_settings_warns_when_restart_needed() {
        let mut agent = idle_agent(true);
        agent.expect_update_operation_settings().return_const(());
        agent.expect_update_settings().returning(|_| true);

        let panel = panel(MockAgentFactory::new());
        let mut session = session();
        session.agent = Some(Box::new(agent));

        let notice = panel.apply_settings(&mut session, &form("7", "3", "100000")).await;
        assert!(matches!(notice, Notice::Warning(_)));
    }

    #[tokio::test]
    async fn test_apply_settings_restart_ignored_when_stopped() {
        let mut agent = idle_agent(false);
        agent.expect_update_operation_settings().return_const(());
        agent.expect_update_settings().returning(|_| true);

        let panel = panel(MockAgentFactory::new());
        let mut session = session();
        session.agent = Some(Box::new(agent));

        let notice = panel.apply_settings(&mut session, &form("7", "3", "100000")).await;
        assert!(matches!(notice, Notice::Success(_)));
    }

    #[tokio::test]
    async fn test_apply_settings_rejects_non_numeric() {
        // No expectations: any update call would panic.
        let agent = idle_agent(true);

        let panel = panel(MockAgentFactory::new());
        let mut session = session();
        session.agent = Some(Box::new(agent));

        let notice = panel.apply_settings(&mut session, &form("abc", "3", "100000")).await;
        assert!(notice.is_error());
        assert!(notice.message().contains("interval_minutes"));
        assert_eq!(session.settings, Settings::default());
    }

    #[tokio::test]
    async fn test_apply_settings_without_agent_is_pending() {
        let panel = panel(MockAgentFactory::new());
        let mut session = session();

        let notice = panel.apply_settings(&mut session, &form("15", "5", "250000")).await;
        assert!(matches!(notice, Notice::Info(_)));
        assert_eq!(session.settings.interval_minutes, 15);
        assert_eq!(session.settings.max_trading_count, 5);
        assert_eq!(session.settings.max_investment, 250_000);
    }

    #[test]
    fn test_preferences_are_validated() {
        let panel = panel(MockAgentFactory::new());
        let mut session = session();

        let notice = panel.set_preferences(
            &mut session,
            Preferences {
                risk_level: Some("aggressive".to_string()),
                target_coins: Some(vec![" btc".to_string(), "eth".to_string()]),
                ..Preferences::default()
            },
        );
        assert!(matches!(notice, Notice::Info(_)));
        assert_eq!(session.settings.risk_level, RiskLevel::Aggressive);
        assert_eq!(session.settings.target_coins, vec!["BTC", "ETH"]);

        let notice = panel.set_preferences(
            &mut session,
            Preferences {
                model: Some("  ".to_string()),
                ..Preferences::default()
            },
        );
        assert!(notice.is_error());
        assert_eq!(session.settings.model, "gpt-4o-mini");

        let notice = panel.set_preferences(
            &mut session,
            Preferences {
                risk_level: Some("yolo".to_string()),
                ..Preferences::default()
            },
        );
        assert!(notice.is_error());
        assert_eq!(session.settings.risk_level, RiskLevel::Aggressive);
    }

    #[test]
    fn test_credentials_merge() {
        let panel = panel(MockAgentFactory::new());
        let mut session = Session::new(Settings::default(), Credentials::default());

        let notice = panel.set_credentials(&mut session, Credentials::new("access", "secret", ""));
        assert!(matches!(notice, Notice::Warning(_)));

        let notice = panel.set_credentials(&mut session, Credentials::new("", "", "sk-model"));
        assert!(matches!(notice, Notice::Success(_)));
        assert!(session.credentials.is_complete());
    }
}
