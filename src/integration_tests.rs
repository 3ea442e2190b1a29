//! Integration tests for kongossa-chat
//!
//! These tests drive whole sessions (view, poll loop, history loader, send
//! path) against a scripted transport and the in-memory surface.

#[cfg(test)]
mod integration_tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::backend::{lock_view, ChatSession, LoadOutcome, SessionOptions, TickOutcome};
    use crate::clock::FixedClock;
    use crate::error::{Result, SyncError};
    use crate::message::{ConversationId, Message, MessageId, UserId};
    use crate::surface::{MemorySurface, PresentationSurface};
    use crate::transport::{ChatTransport, FileUpload, HistoryPage, OutgoingMessage};

    const ME: UserId = 1;
    const AMINA: UserId = 2;
    const CONVERSATION: ConversationId = 7;

    #[derive(Default)]
    struct FakeTransport {
        batches: Mutex<VecDeque<Result<Vec<Message>>>>,
        pages: Mutex<VecDeque<Result<HistoryPage>>>,
        new_calls: Mutex<Vec<Option<i64>>>,
        older_calls: Mutex<Vec<Option<i64>>>,
        sent: Mutex<Vec<String>>,
        marked: Mutex<Vec<i64>>,
        /// When set, every fetch_new waits for a permit before answering.
        gate: Option<Arc<Notify>>,
    }

    impl FakeTransport {
        fn gated() -> (Self, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            let transport = Self {
                gate: Some(gate.clone()),
                ..Self::default()
            };
            (transport, gate)
        }

        fn queue_batch(&self, batch: Vec<Message>) {
            self.batches.lock().unwrap().push_back(Ok(batch));
        }

        fn queue_error(&self, err: SyncError) {
            self.batches.lock().unwrap().push_back(Err(err));
        }

        fn queue_page(&self, messages: Vec<Message>, has_more: Option<bool>) {
            self.pages
                .lock()
                .unwrap()
                .push_back(Ok(HistoryPage { messages, has_more }));
        }

        fn new_calls(&self) -> Vec<Option<i64>> {
            self.new_calls.lock().unwrap().clone()
        }

        fn older_calls(&self) -> Vec<Option<i64>> {
            self.older_calls.lock().unwrap().clone()
        }

        fn marked(&self) -> Vec<i64> {
            self.marked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for FakeTransport {
        async fn fetch_new(&self, _conversation: ConversationId, after: Option<i64>) -> Result<Vec<Message>> {
            self.new_calls.lock().unwrap().push(after);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let next = self.batches.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn fetch_older(
            &self,
            _conversation: ConversationId,
            before: Option<i64>,
            _limit: usize,
        ) -> Result<HistoryPage> {
            self.older_calls.lock().unwrap().push(before);
            let next = self.pages.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(HistoryPage::default()))
        }

        async fn send(&self, _conversation: ConversationId, outgoing: &OutgoingMessage) -> Result<Option<Message>> {
            self.sent.lock().unwrap().push(outgoing.content.clone());
            Ok(None)
        }

        async fn mark_read(&self, message_id: i64) -> Result<()> {
            self.marked.lock().unwrap().push(message_id);
            Ok(())
        }

        async fn unread_count(&self) -> Result<u64> {
            Ok(3)
        }
    }

    type TestSession = ChatSession<FakeTransport, MemorySurface>;

    fn msg(id: i64, sender: UserId, text: &str, at: &str) -> Message {
        Message {
            id: MessageId::Confirmed(id),
            sender_id: sender,
            sender_name: if sender == ME { "me".into() } else { "Amina".into() },
            sender_avatar: None,
            content: Some(text.to_string()),
            attachment: None,
            created_at: at.parse().unwrap(),
            read_at: None,
        }
    }

    fn session_with(transport: Arc<FakeTransport>, surface: MemorySurface) -> TestSession {
        let clock = FixedClock::utc("2024-05-02T12:00:00Z".parse().unwrap());
        let options = SessionOptions {
            current_user: ME,
            display_name: "me".into(),
            poll_interval: Duration::from_millis(2000),
            page_size: 20,
        };
        ChatSession::new(CONVERSATION, transport, surface, Arc::new(clock), options)
    }

    fn session(transport: Arc<FakeTransport>) -> TestSession {
        session_with(transport, MemorySurface::new(400.0, 10.0))
    }

    fn bubble_ids(session: &TestSession) -> Vec<MessageId> {
        lock_view(session.view()).surface().bubble_ids()
    }

    fn watermark(session: &TestSession) -> Option<i64> {
        lock_view(session.view()).state().watermark()
    }

    /// Claim a poll epoch without starting the timer.
    fn begin_manual_polling(session: &TestSession) -> u64 {
        lock_view(session.view()).state_mut().begin_polling()
    }

    async fn tick(session: &TestSession, transport: &Arc<FakeTransport>, epoch: u64) -> TickOutcome {
        crate::backend::poll::poll_once(session.view(), transport, epoch).await
    }

    #[tokio::test]
    async fn test_duplicate_delivery_renders_once() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport.clone());
        let epoch = begin_manual_polling(&session);

        let hello = msg(10, AMINA, "hello", "2024-05-02T10:00:00Z");
        transport.queue_batch(vec![hello.clone()]);
        transport.queue_batch(vec![hello.clone(), hello.clone()]);

        assert_eq!(tick(&session, &transport, epoch).await, TickOutcome::Applied(vec![10]));
        assert_eq!(tick(&session, &transport, epoch).await, TickOutcome::Applied(vec![]));
        assert_eq!(bubble_ids(&session), vec![MessageId::Confirmed(10)]);
    }

    #[tokio::test]
    async fn test_pre_rendered_pending_is_replaced_by_confirmed() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport.clone());
        let epoch = begin_manual_polling(&session);

        let temp_id = session.show_pending("hello");
        assert!(temp_id.is_temporary());
        session.send("hello", None).await.unwrap();
        assert_eq!(bubble_ids(&session), vec![temp_id.clone()]);

        transport.queue_batch(vec![msg(42, ME, "hello", "2024-05-02T11:59:00Z")]);
        tick(&session, &transport, epoch).await;

        assert_eq!(bubble_ids(&session), vec![MessageId::Confirmed(42)]);
        let view = lock_view(session.view());
        assert_eq!(view.reconciler().pending_count(), 0);
        assert!(view.surface().bubble(&temp_id).is_none());
    }

    #[tokio::test]
    async fn test_pending_with_carriage_returns_reconciles() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport.clone());
        let epoch = begin_manual_polling(&session);

        let temp_id = session.show_pending("a\r\nb");
        session.send("a\r\nb", None).await.unwrap();
        assert_eq!(*transport.sent.lock().unwrap(), vec!["a\nb".to_string()]);

        transport.queue_batch(vec![msg(50, ME, "a\nb", "2024-05-02T11:59:00Z")]);
        tick(&session, &transport, epoch).await;

        assert_eq!(bubble_ids(&session), vec![MessageId::Confirmed(50)]);
        let view = lock_view(session.view());
        assert_eq!(view.reconciler().pending_count(), 0);
        assert!(view.surface().bubble(&temp_id).is_none());
    }

    #[tokio::test]
    async fn test_confirmed_echo_after_midnight_moves_to_new_group() {
        let transport = Arc::new(FakeTransport::default());
        let clock = FixedClock::utc("2024-05-02T23:59:30Z".parse().unwrap());
        let options = SessionOptions {
            current_user: ME,
            display_name: "me".into(),
            poll_interval: Duration::from_millis(2000),
            page_size: 20,
        };
        let session: TestSession = ChatSession::new(
            CONVERSATION,
            transport.clone(),
            MemorySurface::new(400.0, 10.0),
            Arc::new(clock),
            options,
        );
        let epoch = begin_manual_polling(&session);

        let temp_id = session.show_pending("late");
        transport.queue_batch(vec![msg(60, ME, "late", "2024-05-03T00:00:10Z")]);
        tick(&session, &transport, epoch).await;

        assert_eq!(bubble_ids(&session), vec![MessageId::Confirmed(60)]);
        let view = lock_view(session.view());
        assert!(view.grouping().group_of(&temp_id).is_none());

        let groups = view.grouping().groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key.day, "2024-05-02");
        assert!(groups[0].is_empty());

        let handle = view.grouping().group_of(&MessageId::Confirmed(60)).unwrap();
        assert_ne!(handle, groups[0].handle);
        assert_eq!(view.grouping().group(handle).unwrap().key.day, "2024-05-03");
    }

    #[tokio::test]
    async fn test_send_action_validates_before_drawing() {
        use crate::backend::main_loop::handlers::{handle_backend_action, VIEWPORT_ROWS};
        use crate::protocol::{BackendAction, SurfaceEvent};
        use crate::surface::ChannelSurface;
        use crossbeam_channel::unbounded;

        let transport = Arc::new(FakeTransport::default());
        let (event_tx, event_rx) = unbounded();
        let options = SessionOptions {
            current_user: ME,
            display_name: "me".into(),
            poll_interval: Duration::from_millis(2000),
            page_size: 20,
        };
        let clock = FixedClock::utc("2024-05-02T12:00:00Z".parse().unwrap());
        let mut session = Some(ChatSession::new(
            CONVERSATION,
            transport.clone(),
            ChannelSurface::new(event_tx.clone(), VIEWPORT_ROWS),
            Arc::new(clock),
            options.clone(),
        ));

        let send = |content: &str| BackendAction::Send {
            content: content.to_string(),
            file: None,
        };

        assert!(handle_backend_action(send("  \r "), &mut session, &transport, &options, &event_tx).await);
        let events: Vec<_> = event_rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SurfaceEvent::Error(_)));
        assert!(transport.sent.lock().unwrap().is_empty());

        assert!(handle_backend_action(send("a\r\nb"), &mut session, &transport, &options, &event_tx).await);
        let drawn: Vec<String> = event_rx
            .try_iter()
            .filter_map(|event| match event {
                SurfaceEvent::BubbleAppended { bubble, .. } => Some(bubble.text),
                _ => None,
            })
            .collect();
        assert_eq!(drawn, vec!["a\nb".to_string()]);
        assert_eq!(*transport.sent.lock().unwrap(), vec!["a\nb".to_string()]);
    }

    #[tokio::test]
    async fn test_send_without_pending_bubble_renders_from_poll() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport.clone());
        let epoch = begin_manual_polling(&session);

        session.send("  hi there ", None).await.unwrap();
        assert_eq!(*transport.sent.lock().unwrap(), vec!["hi there".to_string()]);
        assert!(bubble_ids(&session).is_empty());

        transport.queue_batch(vec![msg(43, ME, "hi there", "2024-05-02T11:59:00Z")]);
        tick(&session, &transport, epoch).await;
        assert_eq!(bubble_ids(&session), vec![MessageId::Confirmed(43)]);
    }

    #[tokio::test]
    async fn test_send_rejects_empty_message_without_network() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport.clone());

        let err = session.send("   ", None).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidMessage(_)));
        assert!(transport.sent.lock().unwrap().is_empty());

        let file = FileUpload {
            file_name: "notes.txt".into(),
            bytes: b"x".to_vec(),
        };
        assert!(session.send("", Some(file)).await.is_ok());
    }

    #[tokio::test]
    async fn test_watermark_is_monotonic_across_polls() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport.clone());
        let epoch = begin_manual_polling(&session);

        transport.queue_batch(vec![
            msg(3, AMINA, "a", "2024-05-02T10:00:00Z"),
            msg(9, AMINA, "b", "2024-05-02T10:01:00Z"),
        ]);
        transport.queue_batch(vec![msg(4, AMINA, "late", "2024-05-02T10:02:00Z")]);
        transport.queue_batch(vec![msg(9, AMINA, "b", "2024-05-02T10:01:00Z")]);

        let mut previous = watermark(&session);
        for _ in 0..3 {
            tick(&session, &transport, epoch).await;
            let current = watermark(&session);
            assert!(current >= previous);
            previous = current;
        }
        assert_eq!(watermark(&session), Some(9));
        assert_eq!(transport.new_calls(), vec![None, Some(9), Some(9)]);
    }

    #[tokio::test]
    async fn test_grouping_by_sender_and_day() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport.clone());
        let epoch = begin_manual_polling(&session);

        transport.queue_batch(vec![
            msg(1, AMINA, "morning", "2024-05-01T08:00:00Z"),
            msg(2, AMINA, "evening", "2024-05-01T20:00:00Z"),
            msg(3, AMINA, "next day", "2024-05-02T08:00:00Z"),
        ]);
        tick(&session, &transport, epoch).await;

        let view = lock_view(session.view());
        let groups: Vec<Vec<MessageId>> = view
            .surface()
            .groups()
            .map(|g| g.bubbles.iter().map(|b| b.id.clone()).collect())
            .collect();
        assert_eq!(
            groups,
            vec![
                vec![MessageId::Confirmed(1), MessageId::Confirmed(2)],
                vec![MessageId::Confirmed(3)],
            ]
        );
        assert_eq!(view.grouping().groups().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_page_ends_pagination() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport.clone());
        session.seed(vec![msg(30, AMINA, "latest", "2024-05-02T10:00:00Z")]);
        let pager = session.pager();

        transport.queue_page(vec![msg(29, AMINA, "older", "2024-05-02T09:00:00Z")], None);
        assert_eq!(pager.load_older().await, LoadOutcome::Loaded(1));
        assert_eq!(pager.load_older().await, LoadOutcome::Exhausted);
        assert!(!pager.has_more());
        assert_eq!(transport.older_calls(), vec![Some(30), Some(29)]);

        lock_view(session.view()).surface_mut().scroll_to(0.0);
        assert_eq!(pager.on_scroll().await, LoadOutcome::Skipped);
        assert_eq!(transport.older_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_history_page_keeps_scroll_anchor() {
        let transport = Arc::new(FakeTransport::default());
        // 5 rows (header + two single-line bubbles) at 200 per row
        let session = session_with(transport.clone(), MemorySurface::new(400.0, 200.0));
        session.seed(vec![
            msg(10, AMINA, "ten", "2024-05-02T10:00:00Z"),
            msg(11, AMINA, "eleven", "2024-05-02T10:05:00Z"),
        ]);
        lock_view(session.view()).surface_mut().scroll_to(0.0);

        let before = lock_view(session.view()).surface().scroll_metrics();
        assert_eq!(before.content_height, 1000.0);

        transport.queue_page(vec![msg(9, AMINA, "nine", "2024-05-02T09:00:00Z")], Some(true));
        assert_eq!(session.pager().on_scroll().await, LoadOutcome::Loaded(1));

        let view = lock_view(session.view());
        let after = view.surface().scroll_metrics();
        assert_eq!(after.content_height, 1400.0);
        assert_eq!(after.scroll_top - before.scroll_top, 400.0);
        assert_eq!(
            view.surface().bubble_ids(),
            vec![MessageId::Confirmed(9), MessageId::Confirmed(10), MessageId::Confirmed(11)]
        );
        assert_eq!(view.state().oldest_id(), Some(9));
    }

    #[tokio::test]
    async fn test_history_page_orders_groups_chronologically() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport.clone());
        session.seed(vec![msg(20, ME, "today", "2024-05-02T10:00:00Z")]);

        // newest first, as some servers return it
        transport.queue_page(
            vec![
                msg(19, AMINA, "y2", "2024-05-01T18:00:00Z"),
                msg(18, AMINA, "y1", "2024-05-01T17:00:00Z"),
                msg(17, ME, "old", "2024-04-30T09:00:00Z"),
            ],
            Some(true),
        );
        session.pager().load_older().await;

        assert_eq!(
            bubble_ids(&session),
            vec![
                MessageId::Confirmed(17),
                MessageId::Confirmed(18),
                MessageId::Confirmed(19),
                MessageId::Confirmed(20),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_page_keeps_history_available() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport.clone());
        transport
            .pages
            .lock()
            .unwrap()
            .push_back(Err(SyncError::MalformedResponse("missing has_more".into())));

        let pager = session.pager();
        assert_eq!(pager.load_older().await, LoadOutcome::Failed);
        assert!(pager.has_more());
        assert!(!lock_view(session.view()).state().is_loading());

        transport.queue_page(vec![msg(5, AMINA, "ok", "2024-05-02T09:00:00Z")], Some(false));
        assert_eq!(pager.load_older().await, LoadOutcome::Loaded(1));
        assert!(!pager.has_more());
    }

    #[tokio::test]
    async fn test_open_loads_latest_page_when_empty() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session(transport.clone());
        transport.queue_page(
            vec![
                msg(1, AMINA, "first", "2024-05-02T09:00:00Z"),
                msg(2, ME, "second", "2024-05-02T09:01:00Z"),
            ],
            Some(false),
        );

        assert_eq!(session.open().await, LoadOutcome::Loaded(2));
        assert_eq!(transport.older_calls(), vec![None]);
        assert!(session.is_polling());
        assert_eq!(watermark(&session), Some(2));
        session.close();
    }

    #[tokio::test]
    async fn test_open_skips_history_when_seeded() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session(transport.clone());
        session.seed(vec![msg(8, AMINA, "seeded", "2024-05-02T09:00:00Z")]);

        assert_eq!(session.open().await, LoadOutcome::Skipped);
        assert!(transport.older_calls().is_empty());
        session.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_ticks_every_interval() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session(transport.clone());
        session.seed(vec![msg(5, AMINA, "seeded", "2024-05-02T09:00:00Z")]);
        transport.queue_batch(vec![msg(6, AMINA, "new", "2024-05-02T11:00:00Z")]);

        session.start_polling();
        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert!(transport.new_calls().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(transport.new_calls(), vec![Some(5)]);
        assert_eq!(bubble_ids(&session).last(), Some(&MessageId::Confirmed(6)));
        assert_eq!(transport.marked(), vec![6]);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(transport.new_calls(), vec![Some(5), Some(6)]);
        session.stop_polling();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_does_not_stop_loop() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session(transport.clone());
        transport.queue_error(SyncError::Status {
            status: 503,
            url: "http://test/chat/7/new-messages/".into(),
        });
        transport.queue_batch(vec![msg(11, AMINA, "back", "2024-05-02T11:00:00Z")]);

        session.start_polling();
        tokio::time::sleep(Duration::from_millis(2001)).await;
        assert!(bubble_ids(&session).is_empty());
        assert!(session.is_polling());

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(bubble_ids(&session), vec![MessageId::Confirmed(11)]);
        session.stop_polling();
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_poll_response_does_not_stop_loop() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session(transport.clone());
        session.seed(vec![msg(4, AMINA, "seeded", "2024-05-02T09:00:00Z")]);
        transport.queue_error(SyncError::MalformedResponse("messages is not a list".into()));
        transport.queue_batch(vec![msg(12, AMINA, "recovered", "2024-05-02T11:00:00Z")]);

        session.start_polling();
        tokio::time::sleep(Duration::from_millis(2001)).await;
        assert_eq!(bubble_ids(&session), vec![MessageId::Confirmed(4)]);
        assert_eq!(watermark(&session), Some(4));
        assert!(session.is_polling());
        assert!(lock_view(session.view()).state().is_polling());

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(transport.new_calls(), vec![Some(4), Some(4)]);
        assert_eq!(
            bubble_ids(&session),
            vec![MessageId::Confirmed(4), MessageId::Confirmed(12)]
        );
        session.stop_polling();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_skips_overlapping_ticks() {
        let (transport, gate) = FakeTransport::gated();
        let transport = Arc::new(transport);
        let mut session = session(transport.clone());

        session.start_polling();
        tokio::time::sleep(Duration::from_millis(6001)).await;
        assert_eq!(transport.new_calls().len(), 1);

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(transport.new_calls().len(), 2);

        gate.notify_one();
        session.stop_polling();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_result() {
        let (transport, gate) = FakeTransport::gated();
        let transport = Arc::new(transport);
        let mut session = session(transport.clone());
        transport.queue_batch(vec![msg(70, AMINA, "too late", "2024-05-02T11:00:00Z")]);

        session.start_polling();
        tokio::time::sleep(Duration::from_millis(2001)).await;
        assert_eq!(transport.new_calls().len(), 1);

        session.stop_polling();
        session.stop_polling();
        assert!(!session.is_polling());

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert!(bubble_ids(&session).is_empty());
        assert_eq!(watermark(&session), None);
        assert!(transport.marked().is_empty());
        assert_eq!(transport.new_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_single_loop() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session(transport.clone());

        session.start_polling();
        session.start_polling();
        tokio::time::sleep(Duration::from_millis(2001)).await;
        assert_eq!(transport.new_calls().len(), 1);
        session.stop_polling();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_session_ignores_everything() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session(transport.clone());
        session.close();

        session.start_polling();
        assert!(!session.is_polling());
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert!(transport.new_calls().is_empty());

        assert_eq!(session.pager().load_older().await, LoadOutcome::Skipped);
        assert!(session.send("hello", None).await.is_err());
    }

    #[tokio::test]
    async fn test_unread_count_passthrough() {
        let transport = Arc::new(FakeTransport::default());
        let session = session(transport);
        assert_eq!(session.unread_count().await.unwrap(), 3);
    }
}
