//! Run orchestration: backfill on startup, then optionally follow the
//! channel and archive each new message.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::delivery::{deliver, resolve_destination};
use crate::history::{PAGE_SIZE, backfill};
use crate::model::{Channel, Message, User, compare_ids};
use crate::packager::{ArchiveLayout, package};
use crate::session::{ChatSession, MessagePage};
use crate::settings::{ArchiveMode, Settings};
use crate::snapshot::snapshot_message;
use crate::status::{Presence, StatusBoard};
use crate::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Backfilling,
    Steady,
    Archiving,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The backfill was delivered and the run stopped (`once` mode).
    Completed { messages: usize },
    /// The follow loop was asked to shut down.
    Stopped { messages: usize },
}

/// Where a per-message archive attempt failed.
enum CycleError {
    /// Snapshotting or packaging the message.
    Build(AppError),
    /// Uploading the bundle.
    Delivery(AppError),
}

impl CycleError {
    fn error(&self) -> &AppError {
        match self {
            CycleError::Build(e) | CycleError::Delivery(e) => e,
        }
    }

    fn into_inner(self) -> AppError {
        match self {
            CycleError::Build(e) | CycleError::Delivery(e) => e,
        }
    }

    /// Hard-limit rejections always end the run. Other delivery failures
    /// only do when `halt_on_delivery` is set.
    fn is_fatal(&self, halt_on_delivery: bool) -> bool {
        match self {
            CycleError::Build(e) => e.is_hard_limit(),
            CycleError::Delivery(e) => halt_on_delivery || e.is_hard_limit(),
        }
    }
}

pub struct Archiver {
    session: Arc<dyn ChatSession>,
    settings: Settings,
    layout: ArchiveLayout,
    status: StatusBoard,
    state: RunState,
    me: Option<User>,
    cursor: Option<String>,
    archived: usize,
}

impl Archiver {
    pub fn new(session: Arc<dyn ChatSession>, settings: Settings) -> Self {
        let layout = ArchiveLayout::new(settings.archive.dir.clone());
        Self {
            session,
            settings,
            layout,
            status: StatusBoard::new(),
            state: RunState::Idle,
            me: None,
            cursor: None,
            archived: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// True once any error has been reported during this run.
    pub fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }

    /// Run to completion. In `follow` mode this only returns when `shutdown`
    /// resolves or a fatal error occurs.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        let result = self.run_inner(shutdown).await;
        if result.is_err() {
            self.state = RunState::Terminated;
        }
        result
    }

    async fn run_inner<F>(&mut self, shutdown: F) -> Result<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        let me = self.session.ready().await?;
        info!(user = %me.tag(), "session ready");
        self.me = Some(me);

        let target_id = match self.settings.target_channel_id() {
            Ok(id) => id.to_string(),
            Err(e) => {
                error!(error = %e, "cannot start archiving");
                return Err(e);
            }
        };

        self.layout.reset().await?;
        let channel = self.session.fetch_channel(&target_id).await?;
        info!(channel = %channel.id, name = channel.display_name(), "archiving channel");

        let messages = self.run_backfill(&channel).await?;
        info!("backfill completed");

        self.state = RunState::Steady;
        self.set_presence(self.status.steady()).await;

        match self.settings.archive.mode {
            ArchiveMode::Once => Ok(RunOutcome::Completed { messages }),
            ArchiveMode::Follow => {
                self.follow(&channel, shutdown).await?;
                Ok(RunOutcome::Stopped {
                    messages: messages + self.archived,
                })
            }
        }
    }

    async fn run_backfill(&mut self, channel: &Channel) -> Result<usize> {
        self.state = RunState::Backfilling;
        let store = self.layout.attachment_store();

        let session = Arc::clone(&self.session);
        let status = &self.status;
        let on_progress = move |count: usize| {
            let session = Arc::clone(&session);
            let presence = status.archiving(count);
            tokio::spawn(async move {
                if let Err(e) = session.update_presence(&presence).await {
                    warn!(error = %e, "failed to update presence");
                }
            });
        };

        let outcome = backfill(self.session.as_ref(), &store, channel, Some(&on_progress)).await?;
        self.cursor = outcome.newest_id.clone();

        let bundle = package(&self.layout, &outcome.manifest).await?;
        deliver(
            self.session.as_ref(),
            channel,
            self.settings.discord.archive_channel_id.as_deref(),
            &bundle,
        )
        .await?;
        Ok(outcome.message_count)
    }

    async fn follow<F>(&mut self, channel: &Channel, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if !self.accepts_channel(channel) {
            warn!(
                channel = %channel.id,
                guild = ?channel.guild_id,
                "target channel is outside the configured guild; new messages will not be archived"
            );
        }

        let mut poll = tokio::time::interval(self.settings.poll_interval());
        let mut presence = tokio::time::interval(self.settings.presence_interval());
        tokio::pin!(shutdown);

        info!("listening for new messages");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    return Ok(());
                }
                _ = poll.tick() => {
                    self.poll_once(channel).await?;
                }
                _ = presence.tick() => {
                    self.set_presence(self.status.steady()).await;
                }
            }
        }
    }

    /// Fetch and archive everything posted since the last poll. Only fatal
    /// errors are returned; anything else degrades the status and is logged.
    pub async fn poll_once(&mut self, channel: &Channel) -> Result<usize> {
        let new_messages = match self.fetch_new_messages(channel).await {
            Ok(messages) => messages,
            Err(e) => {
                self.report_failure(&e, "failed to fetch new messages").await;
                return Ok(0);
            }
        };

        let mut archived = 0;
        for message in new_messages {
            if !self.should_archive(channel, &message) {
                continue;
            }
            match self.archive_message(channel, &message).await {
                Ok(()) => archived += 1,
                Err(e) if e.is_fatal(self.settings.archive.halt_on_delivery_error) => {
                    return Err(e.into_inner());
                }
                Err(e) => self.report_failure(e.error(), "error processing message").await,
            }
        }
        Ok(archived)
    }

    /// New messages after the cursor, oldest first. Advances the cursor.
    async fn fetch_new_messages(&mut self, channel: &Channel) -> Result<Vec<Message>> {
        let page = match &self.cursor {
            Some(after) => MessagePage::after(PAGE_SIZE, after.clone()),
            None => MessagePage::before(PAGE_SIZE, None),
        };
        let mut messages = self.session.fetch_messages(&channel.id, &page).await?;
        messages.sort_by(|a, b| compare_ids(&a.id, &b.id));

        if let Some(newest) = messages.last() {
            self.cursor = Some(newest.id.clone());
        }
        debug!(count = messages.len(), "polled new messages");
        Ok(messages)
    }

    /// Snapshot one message and deliver it as its own bundle.
    async fn archive_message(
        &mut self,
        channel: &Channel,
        message: &Message,
    ) -> std::result::Result<(), CycleError> {
        self.state = RunState::Archiving;
        let result = self.archive_single(channel, message).await;
        self.state = RunState::Steady;
        if result.is_ok() {
            self.archived += 1;
        }
        result
    }

    async fn archive_single(
        &self,
        channel: &Channel,
        message: &Message,
    ) -> std::result::Result<(), CycleError> {
        let store = self.layout.attachment_store();
        let mut manifest = Vec::with_capacity(1);
        snapshot_message(self.session.as_ref(), &store, message, &mut manifest)
            .await
            .map_err(CycleError::Build)?;

        let bundle = package(&self.layout, &manifest)
            .await
            .map_err(CycleError::Build)?;
        deliver(
            self.session.as_ref(),
            channel,
            self.settings.discord.archive_channel_id.as_deref(),
            &bundle,
        )
        .await
        .map_err(CycleError::Delivery)
    }

    fn accepts_channel(&self, channel: &Channel) -> bool {
        match self.settings.discord.guild_id.as_deref() {
            Some(guild) => channel.guild_id.as_deref() == Some(guild),
            None => true,
        }
    }

    fn should_archive(&self, channel: &Channel, message: &Message) -> bool {
        if message.channel_id != channel.id || !self.accepts_channel(channel) {
            return false;
        }
        // Our own uploads land here when bundles go to the source channel.
        !matches!(&self.me, Some(me) if me.id == message.author.id)
    }

    async fn report_failure(&mut self, err: &AppError, what: &str) {
        error!(error = %err, "{}", what);
        let presence = self.status.error();
        self.set_presence(presence).await;
    }

    async fn set_presence(&self, presence: Presence) {
        if let Err(e) = self.session.update_presence(&presence).await {
            warn!(error = %e, "failed to update presence");
        }
    }
}

/// Validate configuration against the platform without archiving anything.
/// Returns the session user, the target channel and the delivery channel.
pub async fn check(session: &dyn ChatSession, settings: &Settings) -> Result<(User, Channel, Channel)> {
    let me = session.ready().await?;
    let target = session.fetch_channel(settings.target_channel_id()?).await?;
    let destination = resolve_destination(
        session,
        &target,
        settings.discord.archive_channel_id.as_deref(),
    )
    .await?;
    Ok((me, target, destination))
}
