use crate::api::{Channel, ThreadReport, ThreadSummary};

// Minted per load; completions carry it back so the machine can recognize
// superseded responses and drop them.
pub type Ticket = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportKey {
    pub channel_id: String,
    pub thread_ts: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub channel_id: Option<String>,
    pub thread_ts: Option<String>,
}

impl Selection {
    pub fn report_key(&self) -> Option<ReportKey> {
        Some(ReportKey {
            channel_id: self.channel_id.clone()?,
            thread_ts: self.thread_ts.clone()?,
        })
    }

    fn matches(&self, key: &ReportKey) -> bool {
        self.channel_id.as_deref() == Some(key.channel_id.as_str())
            && self.thread_ts.as_deref() == Some(key.thread_ts.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStatus {
    pub has_report: bool,
    pub stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelsPane {
    Loading,
    Failed,
    Empty,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadsPane {
    Idle,
    Loading,
    Failed,
    Ready,
}

#[derive(Debug, Clone)]
pub enum ReportPane {
    Idle,
    Loading,
    // No report generated yet; the refresh affordance doubles as "generate".
    Missing,
    Failed,
    Ready(Box<ThreadReport>),
}

// User intents and load completions, in one stream. Completions carry
// errors as display strings so the machine stays decoupled from the
// transport.
#[derive(Debug)]
pub enum Event {
    ChannelSelected(String),
    ThreadSelected(String),
    ReloadThreads,
    RefreshRequested,
    ChannelsLoaded {
        ticket: Ticket,
        result: Result<Vec<Channel>, String>,
    },
    ThreadsLoaded {
        ticket: Ticket,
        result: Result<Vec<ThreadSummary>, String>,
    },
    ReportLoaded {
        ticket: Ticket,
        result: Result<Option<ThreadReport>, String>,
    },
    RefreshCompleted {
        key: ReportKey,
        result: Result<ThreadReport, String>,
    },
}

// Side effects for the caller to run; the machine never performs IO itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LoadChannels {
        ticket: Ticket,
    },
    LoadThreads {
        ticket: Ticket,
        channel_id: String,
        autoselect: bool,
    },
    LoadReport {
        ticket: Ticket,
        key: ReportKey,
    },
    RefreshReport {
        key: ReportKey,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingThreads {
    ticket: Ticket,
    autoselect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingReport {
    ticket: Ticket,
    key: ReportKey,
}

pub struct Browse {
    // Requested at startup (config or --channel); consumed by the first
    // successful channel load.
    requested_channel: Option<String>,
    selection: Selection,
    channels: Vec<Channel>,
    channels_pane: ChannelsPane,
    threads: Vec<ThreadSummary>,
    threads_pane: ThreadsPane,
    report_pane: ReportPane,
    report_status: ReportStatus,
    // Bumped whenever the report pane contents are replaced, so the view can
    // reset its scroll.
    report_revision: u64,
    error: Option<String>,
    next_ticket: Ticket,
    pending_channels: Option<Ticket>,
    pending_threads: Option<PendingThreads>,
    pending_report: Option<PendingReport>,
    // The pair a refresh is in flight for; Some blocks further triggers
    // until the call resolves. Its result only renders if that pair is still
    // selected when it arrives.
    refresh: Option<ReportKey>,
}

impl Browse {
    pub fn new(requested_channel: Option<String>) -> Self {
        Self {
            requested_channel: requested_channel.filter(|id| !id.trim().is_empty()),
            selection: Selection::default(),
            channels: Vec::new(),
            channels_pane: ChannelsPane::Loading,
            threads: Vec::new(),
            threads_pane: ThreadsPane::Idle,
            report_pane: ReportPane::Idle,
            report_status: ReportStatus::default(),
            report_revision: 0,
            error: None,
            next_ticket: 0,
            pending_channels: None,
            pending_threads: None,
            pending_report: None,
            refresh: None,
        }
    }

    pub fn start(&mut self) -> Vec<Command> {
        let ticket = self.mint();
        self.pending_channels = Some(ticket);
        self.channels_pane = ChannelsPane::Loading;
        vec![Command::LoadChannels { ticket }]
    }

    pub fn dispatch(&mut self, event: Event) -> Vec<Command> {
        match event {
            Event::ChannelSelected(channel_id) => self.on_channel_selected(channel_id),
            Event::ThreadSelected(thread_ts) => self.on_thread_selected(thread_ts),
            Event::ReloadThreads => self.on_reload_threads(),
            Event::RefreshRequested => self.on_refresh_requested(),
            Event::ChannelsLoaded { ticket, result } => self.on_channels_loaded(ticket, result),
            Event::ThreadsLoaded { ticket, result } => self.on_threads_loaded(ticket, result),
            Event::ReportLoaded { ticket, result } => self.on_report_loaded(ticket, result),
            Event::RefreshCompleted { key, result } => self.on_refresh_completed(key, result),
        }
    }

    fn on_channel_selected(&mut self, channel_id: String) -> Vec<Command> {
        self.error = None;
        if self.selection.channel_id.as_deref() == Some(channel_id.as_str()) {
            return Vec::new();
        }
        if !self.channels.iter().any(|ch| ch.channel_id == channel_id) {
            return Vec::new();
        }

        self.selection.channel_id = Some(channel_id.clone());
        self.selection.thread_ts = None;
        self.threads.clear();
        self.pending_report = None;
        self.set_report_pane(ReportPane::Idle);
        self.report_status = ReportStatus::default();
        self.load_threads(channel_id, true)
    }

    fn on_thread_selected(&mut self, thread_ts: String) -> Vec<Command> {
        self.error = None;
        let Some(channel_id) = self.selection.channel_id.clone() else {
            return Vec::new();
        };
        self.selection.thread_ts = Some(thread_ts.clone());
        self.load_report(ReportKey {
            channel_id,
            thread_ts,
        })
    }

    fn on_reload_threads(&mut self) -> Vec<Command> {
        self.error = None;
        let Some(channel_id) = self.selection.channel_id.clone() else {
            return Vec::new();
        };
        self.load_threads(channel_id, false)
    }

    fn on_refresh_requested(&mut self) -> Vec<Command> {
        // At most one refresh in flight per session; further triggers are
        // ignored until the current one resolves.
        if self.refresh.is_some() {
            return Vec::new();
        }
        let Some(key) = self.selection.report_key() else {
            return Vec::new();
        };
        self.error = None;
        self.refresh = Some(key.clone());
        vec![Command::RefreshReport { key }]
    }

    fn on_channels_loaded(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<Channel>, String>,
    ) -> Vec<Command> {
        if self.pending_channels != Some(ticket) {
            return Vec::new();
        }
        self.pending_channels = None;

        match result {
            Ok(channels) => {
                self.channels = channels;
                if self.channels.is_empty() {
                    // Nothing to browse; leave every pane in a placeholder
                    // state and issue no further loads.
                    self.channels_pane = ChannelsPane::Empty;
                    self.threads_pane = ThreadsPane::Idle;
                    self.set_report_pane(ReportPane::Idle);
                    return Vec::new();
                }
                self.channels_pane = ChannelsPane::Ready;
                let requested = self.requested_channel.take();
                match bootstrap_channel(&self.channels, requested.as_deref()) {
                    Some(channel_id) => {
                        self.selection.channel_id = Some(channel_id.clone());
                        self.selection.thread_ts = None;
                        self.load_threads(channel_id, true)
                    }
                    None => Vec::new(),
                }
            }
            Err(message) => {
                self.channels_pane = ChannelsPane::Failed;
                self.error = Some(message);
                Vec::new()
            }
        }
    }

    fn on_threads_loaded(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<ThreadSummary>, String>,
    ) -> Vec<Command> {
        let Some(pending) = self.pending_threads else {
            return Vec::new();
        };
        if pending.ticket != ticket {
            return Vec::new();
        }
        self.pending_threads = None;

        match result {
            Ok(rows) => {
                self.threads = rows;
                self.threads_pane = ThreadsPane::Ready;
                if pending.autoselect {
                    let first_ts = self.threads.first().map(|row| row.thread_ts.clone());
                    match first_ts {
                        Some(thread_ts) => {
                            let Some(channel_id) = self.selection.channel_id.clone() else {
                                return Vec::new();
                            };
                            self.selection.thread_ts = Some(thread_ts.clone());
                            return self.load_report(ReportKey {
                                channel_id,
                                thread_ts,
                            });
                        }
                        None => {
                            self.selection.thread_ts = None;
                            self.set_report_pane(ReportPane::Idle);
                            self.report_status = ReportStatus::default();
                        }
                    }
                }
                // Non-autoselect reloads replace the rows and leave the
                // selection and the rendered report untouched.
                Vec::new()
            }
            Err(message) => {
                self.threads_pane = ThreadsPane::Failed;
                self.error = Some(message);
                Vec::new()
            }
        }
    }

    fn on_report_loaded(
        &mut self,
        ticket: Ticket,
        result: Result<Option<ThreadReport>, String>,
    ) -> Vec<Command> {
        let Some(pending) = self.pending_report.clone() else {
            return Vec::new();
        };
        if pending.ticket != ticket {
            return Vec::new();
        }
        self.pending_report = None;
        if !self.selection.matches(&pending.key) {
            return Vec::new();
        }

        match result {
            Ok(Some(report)) => {
                self.report_status = ReportStatus {
                    has_report: true,
                    stale: report.meta.is_stale,
                };
                self.set_report_pane(ReportPane::Ready(Box::new(report)));
            }
            Ok(None) => {
                self.report_status = ReportStatus::default();
                self.set_report_pane(ReportPane::Missing);
            }
            Err(message) => {
                self.report_status = ReportStatus::default();
                self.set_report_pane(ReportPane::Failed);
                self.error = Some(message);
            }
        }
        Vec::new()
    }

    fn on_refresh_completed(
        &mut self,
        key: ReportKey,
        result: Result<ThreadReport, String>,
    ) -> Vec<Command> {
        let Some(flight) = self.refresh.clone() else {
            return Vec::new();
        };
        if flight != key {
            return Vec::new();
        }
        // The guard clears on every completion, success or failure, so the
        // next trigger is allowed even after an error.
        self.refresh = None;

        if !self.selection.matches(&key) {
            // The operator moved on while the backend was generating; the
            // result is dropped without touching panes or the error slot.
            return Vec::new();
        }

        match result {
            Ok(report) => {
                self.report_status = ReportStatus {
                    has_report: true,
                    stale: report.meta.is_stale,
                };
                self.set_report_pane(ReportPane::Ready(Box::new(report)));
                // Resync the list so row badges (report ✓, updated) reflect
                // the regeneration, without moving the selection.
                self.load_threads(key.channel_id, false)
            }
            Err(message) => {
                self.error = Some(message);
                // The previously rendered report stays up; it is simply
                // known to be behind now.
                self.report_status = ReportStatus {
                    has_report: self.report_status.has_report,
                    stale: true,
                };
                Vec::new()
            }
        }
    }

    fn load_threads(&mut self, channel_id: String, autoselect: bool) -> Vec<Command> {
        let ticket = self.mint();
        self.pending_threads = Some(PendingThreads { ticket, autoselect });
        self.threads_pane = ThreadsPane::Loading;
        vec![Command::LoadThreads {
            ticket,
            channel_id,
            autoselect,
        }]
    }

    fn load_report(&mut self, key: ReportKey) -> Vec<Command> {
        let ticket = self.mint();
        self.pending_report = Some(PendingReport {
            ticket,
            key: key.clone(),
        });
        self.set_report_pane(ReportPane::Loading);
        vec![Command::LoadReport { ticket, key }]
    }

    fn set_report_pane(&mut self, pane: ReportPane) {
        self.report_pane = pane;
        self.report_revision = self.report_revision.wrapping_add(1);
    }

    fn mint(&mut self) -> Ticket {
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.next_ticket
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn threads(&self) -> &[ThreadSummary] {
        &self.threads
    }

    pub fn channels_pane(&self) -> ChannelsPane {
        self.channels_pane
    }

    pub fn threads_pane(&self) -> ThreadsPane {
        self.threads_pane
    }

    pub fn report_pane(&self) -> &ReportPane {
        &self.report_pane
    }

    pub fn report_revision(&self) -> u64 {
        self.report_revision
    }

    pub fn report_status(&self) -> ReportStatus {
        self.report_status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.refresh.is_some()
    }

    pub fn loading(&self) -> bool {
        self.pending_channels.is_some()
            || self.pending_threads.is_some()
            || self.pending_report.is_some()
            || self.refresh.is_some()
    }

    pub fn refresh_label(&self) -> &'static str {
        if self.refresh.is_some() {
            "generating…"
        } else if self.report_status.has_report {
            "refresh report"
        } else {
            "generate report"
        }
    }

    pub fn status_badge(&self) -> &'static str {
        if self.refresh.is_some() {
            "report: refreshing…"
        } else if !self.report_status.has_report {
            "report: none"
        } else if self.report_status.stale {
            "report: stale"
        } else {
            "report: up to date"
        }
    }
}

// The requested channel when the backend lists it, otherwise the first
// listed channel.
pub fn bootstrap_channel(channels: &[Channel], requested: Option<&str>) -> Option<String> {
    if let Some(requested) = requested {
        if let Some(found) = channels.iter().find(|ch| ch.channel_id == requested) {
            return Some(found.channel_id.clone());
        }
    }
    channels.first().map(|ch| ch.channel_id.clone())
}

#[cfg(test)]
mod tests {
    use crate::api::{ReportBody, ReportMeta};

    use super::*;

    fn chan(id: &str) -> Channel {
        Channel {
            channel_id: id.to_string(),
            name: Some(format!("chan-{id}")),
            is_active: true,
        }
    }

    fn summary(channel_id: &str, thread_ts: &str) -> ThreadSummary {
        ThreadSummary {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
            title: Some(format!("thread {thread_ts}")),
            one_line: None,
            reply_count: 3,
            updated_at: "2024-05-03T12:00:00".to_string(),
            has_report: true,
        }
    }

    fn report(channel_id: &str, thread_ts: &str, stale: bool) -> ThreadReport {
        ThreadReport {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
            report_json: ReportBody {
                topic: Some(format!("topic {thread_ts}")),
                ..ReportBody::default()
            },
            model: "gpt-4o-mini".to_string(),
            source_latest_ts: thread_ts.to_string(),
            source_latest_ts_epoch: 0.0,
            updated_at: "2024-05-03T12:00:00".to_string(),
            meta: ReportMeta { is_stale: stale },
        }
    }

    fn booted(channels: Vec<Channel>, requested: Option<&str>) -> (Browse, Vec<Command>) {
        let mut browse = Browse::new(requested.map(str::to_string));
        let start = browse.start();
        let ticket = match start.as_slice() {
            [Command::LoadChannels { ticket }] => *ticket,
            other => panic!("unexpected startup commands: {other:?}"),
        };
        let commands = browse.dispatch(Event::ChannelsLoaded {
            ticket,
            result: Ok(channels),
        });
        (browse, commands)
    }

    fn thread_ticket(commands: &[Command]) -> Ticket {
        match commands {
            [Command::LoadThreads { ticket, .. }] => *ticket,
            other => panic!("expected a thread load, got: {other:?}"),
        }
    }

    fn report_ticket(commands: &[Command]) -> Ticket {
        match commands {
            [Command::LoadReport { ticket, .. }] => *ticket,
            other => panic!("expected a report load, got: {other:?}"),
        }
    }

    // Boots with one channel, lands a thread list with T1 selected and its
    // report rendered.
    fn browsing_t1(stale: bool) -> Browse {
        let (mut browse, commands) = booted(vec![chan("C1")], None);
        let ticket = thread_ticket(&commands);
        let commands = browse.dispatch(Event::ThreadsLoaded {
            ticket,
            result: Ok(vec![summary("C1", "T1"), summary("C1", "T2")]),
        });
        let ticket = report_ticket(&commands);
        let commands = browse.dispatch(Event::ReportLoaded {
            ticket,
            result: Ok(Some(report("C1", "T1", stale))),
        });
        assert!(commands.is_empty());
        browse
    }

    fn rendered_topic(browse: &Browse) -> Option<String> {
        match browse.report_pane() {
            ReportPane::Ready(report) => report.report_json.topic.clone(),
            _ => None,
        }
    }

    #[test]
    fn bootstrap_prefers_requested_channel() {
        let (browse, commands) = booted(vec![chan("C1"), chan("C2")], Some("C2"));
        assert_eq!(browse.selection().channel_id.as_deref(), Some("C2"));
        match commands.as_slice() {
            [Command::LoadThreads {
                channel_id,
                autoselect,
                ..
            }] => {
                assert_eq!(channel_id, "C2");
                assert!(autoselect);
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn bootstrap_falls_back_to_first_channel() {
        let (browse, _) = booted(vec![chan("C1"), chan("C2")], Some("C9"));
        assert_eq!(browse.selection().channel_id.as_deref(), Some("C1"));
    }

    #[test]
    fn empty_channel_list_issues_no_loads() {
        let (mut browse, commands) = booted(Vec::new(), None);
        assert!(commands.is_empty());
        assert_eq!(browse.channels_pane(), ChannelsPane::Empty);
        assert_eq!(browse.threads_pane(), ThreadsPane::Idle);
        assert!(matches!(browse.report_pane(), ReportPane::Idle));

        // With nothing selected the other intents are inert too.
        assert!(browse.dispatch(Event::ThreadSelected("T1".into())).is_empty());
        assert!(browse.dispatch(Event::ReloadThreads).is_empty());
        assert!(browse.dispatch(Event::RefreshRequested).is_empty());
    }

    #[test]
    fn channel_list_failure_lands_in_error_slot() {
        let (browse, commands) = booted_err();
        assert!(commands.is_empty());
        assert_eq!(browse.channels_pane(), ChannelsPane::Failed);
        assert_eq!(browse.error(), Some("db unavailable"));
    }

    fn booted_err() -> (Browse, Vec<Command>) {
        let mut browse = Browse::new(None);
        let start = browse.start();
        let ticket = match start.as_slice() {
            [Command::LoadChannels { ticket }] => *ticket,
            other => panic!("unexpected startup commands: {other:?}"),
        };
        let commands = browse.dispatch(Event::ChannelsLoaded {
            ticket,
            result: Err("db unavailable".to_string()),
        });
        (browse, commands)
    }

    #[test]
    fn initial_thread_list_autoselects_first_thread() {
        let (mut browse, commands) = booted(vec![chan("C1")], None);
        let ticket = thread_ticket(&commands);
        let commands = browse.dispatch(Event::ThreadsLoaded {
            ticket,
            result: Ok(vec![summary("C1", "T7"), summary("C1", "T8")]),
        });
        assert_eq!(browse.selection().thread_ts.as_deref(), Some("T7"));
        match commands.as_slice() {
            [Command::LoadReport { key, .. }] => {
                assert_eq!(key.thread_ts, "T7");
                assert_eq!(key.channel_id, "C1");
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn empty_thread_list_clears_thread_selection() {
        let (mut browse, commands) = booted(vec![chan("C1")], None);
        let ticket = thread_ticket(&commands);
        let commands = browse.dispatch(Event::ThreadsLoaded {
            ticket,
            result: Ok(Vec::new()),
        });
        assert!(commands.is_empty());
        assert_eq!(browse.selection().thread_ts, None);
        assert_eq!(browse.threads_pane(), ThreadsPane::Ready);
        assert!(matches!(browse.report_pane(), ReportPane::Idle));
    }

    #[test]
    fn manual_reload_preserves_selection() {
        let mut browse = browsing_t1(false);
        let commands = browse.dispatch(Event::ReloadThreads);
        match commands.as_slice() {
            [Command::LoadThreads { autoselect, .. }] => assert!(!autoselect),
            other => panic!("unexpected commands: {other:?}"),
        }
        let ticket = thread_ticket(&commands);
        let commands = browse.dispatch(Event::ThreadsLoaded {
            ticket,
            result: Ok(vec![summary("C1", "T0"), summary("C1", "T1")]),
        });
        // No report load: the selection did not move even though a new row
        // now sits at the top of the list.
        assert!(commands.is_empty());
        assert_eq!(browse.selection().thread_ts.as_deref(), Some("T1"));
        assert_eq!(rendered_topic(&browse).as_deref(), Some("topic T1"));
    }

    #[test]
    fn superseded_report_load_is_discarded() {
        let mut browse = browsing_t1(false);
        let first = browse.dispatch(Event::ThreadSelected("T2".into()));
        let first_ticket = report_ticket(&first);
        let second = browse.dispatch(Event::ThreadSelected("T1".into()));
        let second_ticket = report_ticket(&second);

        // The T2 response arrives after the operator already moved back to
        // T1; it must not render.
        let commands = browse.dispatch(Event::ReportLoaded {
            ticket: first_ticket,
            result: Ok(Some(report("C1", "T2", false))),
        });
        assert!(commands.is_empty());
        assert!(matches!(browse.report_pane(), ReportPane::Loading));

        let commands = browse.dispatch(Event::ReportLoaded {
            ticket: second_ticket,
            result: Ok(Some(report("C1", "T1", false))),
        });
        assert!(commands.is_empty());
        assert_eq!(rendered_topic(&browse).as_deref(), Some("topic T1"));
    }

    #[test]
    fn channel_switch_discards_old_thread_list_response() {
        let (mut browse, commands) = booted(vec![chan("C1"), chan("C2")], None);
        let old_ticket = thread_ticket(&commands);

        let commands = browse.dispatch(Event::ChannelSelected("C2".into()));
        assert_eq!(browse.selection().channel_id.as_deref(), Some("C2"));
        assert_eq!(browse.selection().thread_ts, None);
        let new_ticket = thread_ticket(&commands);

        // The C1 list lands late and is dropped.
        let commands = browse.dispatch(Event::ThreadsLoaded {
            ticket: old_ticket,
            result: Ok(vec![summary("C1", "T1")]),
        });
        assert!(commands.is_empty());
        assert!(browse.threads().is_empty());

        let commands = browse.dispatch(Event::ThreadsLoaded {
            ticket: new_ticket,
            result: Ok(vec![summary("C2", "T9")]),
        });
        assert_eq!(browse.selection().thread_ts.as_deref(), Some("T9"));
        assert_eq!(commands.len(), 1);
    }

    #[test]
    fn reselecting_current_channel_is_inert() {
        let mut browse = browsing_t1(false);
        let commands = browse.dispatch(Event::ChannelSelected("C1".into()));
        assert!(commands.is_empty());
        assert_eq!(browse.selection().thread_ts.as_deref(), Some("T1"));
    }

    #[test]
    fn missing_report_offers_generation() {
        let mut browse = browsing_t1(false);
        let commands = browse.dispatch(Event::ThreadSelected("T2".into()));
        let ticket = report_ticket(&commands);
        browse.dispatch(Event::ReportLoaded {
            ticket,
            result: Ok(None),
        });
        assert!(matches!(browse.report_pane(), ReportPane::Missing));
        assert_eq!(
            browse.report_status(),
            ReportStatus {
                has_report: false,
                stale: false
            }
        );
        assert_eq!(browse.refresh_label(), "generate report");
        assert_eq!(browse.status_badge(), "report: none");
    }

    #[test]
    fn refresh_guard_blocks_second_trigger_until_completion() {
        let mut browse = browsing_t1(true);

        let first = browse.dispatch(Event::RefreshRequested);
        assert_eq!(first.len(), 1);
        assert!(browse.refresh_in_flight());

        // Triggered again before any completion: ignored.
        let second = browse.dispatch(Event::RefreshRequested);
        assert!(second.is_empty());

        let key = ReportKey {
            channel_id: "C1".into(),
            thread_ts: "T1".into(),
        };
        browse.dispatch(Event::RefreshCompleted {
            key,
            result: Ok(report("C1", "T1", false)),
        });
        assert!(!browse.refresh_in_flight());

        // After completion a new refresh may start.
        let third = browse.dispatch(Event::RefreshRequested);
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn refresh_success_renders_payload_and_resyncs_list() {
        let mut browse = browsing_t1(true);
        assert_eq!(browse.status_badge(), "report: stale");

        browse.dispatch(Event::RefreshRequested);
        assert_eq!(browse.refresh_label(), "generating…");
        assert_eq!(browse.status_badge(), "report: refreshing…");

        let key = ReportKey {
            channel_id: "C1".into(),
            thread_ts: "T1".into(),
        };
        let commands = browse.dispatch(Event::RefreshCompleted {
            key,
            result: Ok(report("C1", "T1", false)),
        });
        // Rendered directly from the refresh payload, no refetch.
        assert_eq!(rendered_topic(&browse).as_deref(), Some("topic T1"));
        assert_eq!(
            browse.report_status(),
            ReportStatus {
                has_report: true,
                stale: false
            }
        );
        match commands.as_slice() {
            [Command::LoadThreads {
                channel_id,
                autoselect,
                ..
            }] => {
                assert_eq!(channel_id, "C1");
                assert!(!autoselect);
            }
            other => panic!("unexpected commands: {other:?}"),
        }

        // The resync lands and the selection still points at T1.
        let ticket = thread_ticket(&commands);
        browse.dispatch(Event::ThreadsLoaded {
            ticket,
            result: Ok(vec![summary("C1", "T1"), summary("C1", "T2")]),
        });
        assert_eq!(browse.selection().thread_ts.as_deref(), Some("T1"));
    }

    #[test]
    fn refresh_failure_keeps_report_and_marks_it_stale() {
        let mut browse = browsing_t1(false);
        browse.dispatch(Event::RefreshRequested);

        let key = ReportKey {
            channel_id: "C1".into(),
            thread_ts: "T1".into(),
        };
        let commands = browse.dispatch(Event::RefreshCompleted {
            key,
            result: Err("LLM quota exhausted".to_string()),
        });
        assert!(commands.is_empty());
        assert!(!browse.refresh_in_flight());
        assert_eq!(browse.error(), Some("LLM quota exhausted"));
        // The old report stays visible but is flagged stale; the backend
        // may have newer messages than what is on screen.
        assert_eq!(rendered_topic(&browse).as_deref(), Some("topic T1"));
        assert_eq!(
            browse.report_status(),
            ReportStatus {
                has_report: true,
                stale: true
            }
        );
        assert_eq!(browse.status_badge(), "report: stale");
    }

    #[test]
    fn refresh_result_for_abandoned_selection_is_dropped() {
        let mut browse = browsing_t1(true);
        browse.dispatch(Event::RefreshRequested);

        // The operator moves to T2 while the refresh runs.
        let commands = browse.dispatch(Event::ThreadSelected("T2".into()));
        let ticket = report_ticket(&commands);
        browse.dispatch(Event::ReportLoaded {
            ticket,
            result: Ok(Some(report("C1", "T2", false))),
        });

        let key = ReportKey {
            channel_id: "C1".into(),
            thread_ts: "T1".into(),
        };
        let commands = browse.dispatch(Event::RefreshCompleted {
            key,
            result: Ok(report("C1", "T1", false)),
        });
        // No render, no list resync; only the guard clears.
        assert!(commands.is_empty());
        assert!(!browse.refresh_in_flight());
        assert_eq!(rendered_topic(&browse).as_deref(), Some("topic T2"));
    }

    #[test]
    fn failed_refresh_for_abandoned_selection_stays_silent() {
        let mut browse = browsing_t1(true);
        browse.dispatch(Event::RefreshRequested);

        let commands = browse.dispatch(Event::ThreadSelected("T2".into()));
        let ticket = report_ticket(&commands);
        browse.dispatch(Event::ReportLoaded {
            ticket,
            result: Ok(Some(report("C1", "T2", false))),
        });

        let key = ReportKey {
            channel_id: "C1".into(),
            thread_ts: "T1".into(),
        };
        browse.dispatch(Event::RefreshCompleted {
            key,
            result: Err("boom".to_string()),
        });
        // The failure belongs to a pair no longer on screen; the error slot
        // stays clean and T2's status is untouched.
        assert_eq!(browse.error(), None);
        assert!(!browse.refresh_in_flight());
        assert_eq!(
            browse.report_status(),
            ReportStatus {
                has_report: true,
                stale: false
            }
        );
    }

    #[test]
    fn user_intent_clears_previous_error() {
        let mut browse = browsing_t1(false);
        browse.dispatch(Event::RefreshRequested);
        browse.dispatch(Event::RefreshCompleted {
            key: ReportKey {
                channel_id: "C1".into(),
                thread_ts: "T1".into(),
            },
            result: Err("boom".to_string()),
        });
        assert_eq!(browse.error(), Some("boom"));

        browse.dispatch(Event::ThreadSelected("T2".into()));
        assert_eq!(browse.error(), None);
    }

    #[test]
    fn bootstrap_channel_prefers_listed_request() {
        let channels = vec![chan("C1"), chan("C2")];
        assert_eq!(bootstrap_channel(&channels, Some("C2")).as_deref(), Some("C2"));
        assert_eq!(bootstrap_channel(&channels, Some("C9")).as_deref(), Some("C1"));
        assert_eq!(bootstrap_channel(&channels, None).as_deref(), Some("C1"));
        assert_eq!(bootstrap_channel(&[], Some("C1")), None);
    }

    #[test]
    fn report_revision_tracks_pane_replacement() {
        let mut browse = browsing_t1(false);
        let before = browse.report_revision();
        let commands = browse.dispatch(Event::ThreadSelected("T2".into()));
        assert!(browse.report_revision() > before);

        let ticket = report_ticket(&commands);
        let mid = browse.report_revision();
        browse.dispatch(Event::ReportLoaded {
            ticket,
            result: Ok(Some(report("C1", "T2", false))),
        });
        assert!(browse.report_revision() > mid);
    }
}
