use crate::automation::actions;
use crate::automation::providers::{AutomationProviders, CalendarApi, Completion, InboundEmail, Mailbox};
use crate::models::user_models::User;
use crate::AppState;

/// Runs every enabled automation action for one inbound message. Actions are
/// independent: a failure in one is logged and must not stop the others, and
/// nothing here propagates back to the webhook transport.
pub async fn process_message<M, C, L>(
    state: &AppState,
    providers: &AutomationProviders<M, C, L>,
    user: &User,
    email: &InboundEmail,
) where
    M: Mailbox,
    C: CalendarApi,
    L: Completion,
{
    let bot = match state
        .bot_repository
        .find_bot_for_sender(user.id, &email.sender_email)
    {
        Ok(Some(bot)) => bot,
        Ok(None) => {
            tracing::info!(
                "No active bot for user {} and sender {}, message {} left alone",
                user.id,
                email.sender_email,
                email.id
            );
            return;
        }
        Err(e) => {
            tracing::error!("Bot lookup failed for user {}: {}", user.id, e);
            return;
        }
    };

    tracing::info!(
        "Bot {} ({}) handling message {} from {}",
        bot.id,
        bot.name,
        email.id,
        email.sender_email
    );

    if bot.auto_summarize {
        if let Err(e) = actions::run_summarize(state, &providers.completion, user, email).await {
            tracing::error!("Summarize action failed for message {}: {}", email.id, e);
        }
    }

    if bot.auto_extract_tasks || bot.auto_extract_meetings {
        if let Err(e) = actions::run_extraction(
            state,
            &providers.completion,
            &providers.calendar,
            user,
            &bot,
            email,
        )
        .await
        {
            tracing::error!("Extraction action failed for message {}: {}", email.id, e);
        }
    }

    if bot.auto_reply {
        if let Err(e) =
            actions::run_auto_reply(&providers.mailbox, &providers.completion, &bot, email).await
        {
            tracing::error!("Auto-reply action failed for message {}: {}", email.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::providers::fakes::{
        sample_email, FakeCalendar, FakeCompletion, FakeMailbox,
    };
    use crate::test_support::{seed_bot, seed_user, test_state, BotFlags};

    fn providers(
        mailbox: FakeMailbox,
        calendar: FakeCalendar,
        completion: FakeCompletion,
    ) -> AutomationProviders<FakeMailbox, FakeCalendar, FakeCompletion> {
        AutomationProviders {
            mailbox,
            calendar,
            completion,
        }
    }

    #[tokio::test]
    async fn unmatched_sender_triggers_nothing() {
        let state = test_state();
        let user = seed_user(&state, "a@x.com");
        seed_bot(&state, user.id, "boss@corp.com", BotFlags::summarize_only());

        let email = sample_email("m1", "stranger@elsewhere.com");
        let p = providers(
            FakeMailbox::default(),
            FakeCalendar::working(),
            FakeCompletion::default(),
        );
        process_message(&state, &p, &user, &email).await;

        assert!(state
            .bot_repository
            .get_summaries_for_user(user.id)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn summarize_only_bot_creates_summary_and_nothing_else() {
        let state = test_state();
        let user = seed_user(&state, "a@x.com");
        seed_bot(&state, user.id, "boss@corp.com", BotFlags::summarize_only());

        let mut completion = FakeCompletion::default();
        completion.by_schema.insert(
            "summarize_email",
            r#"{"summary": "Planning meeting request", "priority_score": 70}"#.to_string(),
        );

        let email = sample_email("m1", "boss@corp.com");
        let p = providers(FakeMailbox::default(), FakeCalendar::working(), completion);
        process_message(&state, &p, &user, &email).await;

        let summaries = state.bot_repository.get_summaries_for_user(user.id).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].summary, "Planning meeting request");
        assert_eq!(summaries[0].priority_score, 70);
        assert!(state.task_repository.get_tasks_for_user(user.id).unwrap().is_empty());
        assert!(state
            .task_repository
            .get_calendar_tasks_for_user(user.id)
            .unwrap()
            .is_empty());
        assert!(p.mailbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_extraction_does_not_block_summary_or_reply() {
        let state = test_state();
        let user = seed_user(&state, "a@x.com");
        seed_bot(&state, user.id, "boss@corp.com", BotFlags::all());

        let mut completion = FakeCompletion::default();
        completion.by_schema.insert(
            "summarize_email",
            r#"{"summary": "ok", "priority_score": 10}"#.to_string(),
        );
        completion.fail_schemas.push("extract_items");

        let email = sample_email("m1", "boss@corp.com");
        let p = providers(FakeMailbox::default(), FakeCalendar::working(), completion);
        process_message(&state, &p, &user, &email).await;

        // Sibling actions still ran and their side effects are observable
        assert_eq!(state.bot_repository.get_summaries_for_user(user.id).unwrap().len(), 1);
        let sent = p.mailbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Re: Quarterly planning");
        assert!(state.task_repository.get_tasks_for_user(user.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn extraction_creates_tasks_and_meeting_with_fixed_priority() {
        let state = test_state();
        let user = seed_user(&state, "a@x.com");
        let bot = seed_bot(&state, user.id, "boss@corp.com", BotFlags::extract_all());

        let mut completion = FakeCompletion::default();
        completion.by_schema.insert(
            "extract_items",
            r#"{
                "tasks": [
                    {"description": "Send the report", "deadline": "2026-03-01", "priority": "High"},
                    {"description": "Book a room", "priority": "Whenever"}
                ],
                "meeting": {"title": "Quarter planning", "date": "2026-02-10", "time": "14:00",
                            "duration": "2 hours", "agenda": "Roadmap"}
            }"#
            .to_string(),
        );

        let email = sample_email("m1", "boss@corp.com");
        let p = providers(FakeMailbox::default(), FakeCalendar::working(), completion);
        process_message(&state, &p, &user, &email).await;

        let tasks = state.task_repository.get_tasks_for_user(user.id).unwrap();
        assert_eq!(tasks.len(), 2);
        let report = tasks.iter().find(|t| t.description == "Send the report").unwrap();
        assert_eq!(report.priority, "high");
        assert_eq!(report.deadline.as_deref(), Some("2026-03-01"));
        assert_eq!(report.bot_id, Some(bot.id));
        assert!(report.created_by_bot);
        let room = tasks.iter().find(|t| t.description == "Book a room").unwrap();
        assert_eq!(room.priority, "medium");
        assert_eq!(room.deadline, None);

        let meetings = state.task_repository.get_calendar_tasks_for_user(user.id).unwrap();
        assert_eq!(meetings.len(), 1);
        assert_eq!(meetings[0].status, "pending");
        assert_eq!(meetings[0].priority, "high");
        assert!(meetings[0].calendar_event_id.is_some());
        assert_eq!(p.calendar.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn calendar_failure_still_creates_the_record() {
        let state = test_state();
        let user = seed_user(&state, "a@x.com");
        seed_bot(&state, user.id, "boss@corp.com", BotFlags::extract_all());

        let mut completion = FakeCompletion::default();
        completion.by_schema.insert(
            "extract_items",
            r#"{"tasks": [], "meeting": {"title": "Sync", "date": "2026-02-10"}}"#.to_string(),
        );

        let email = sample_email("m1", "boss@corp.com");
        let p = providers(FakeMailbox::default(), FakeCalendar::broken(), completion);
        process_message(&state, &p, &user, &email).await;

        let meetings = state.task_repository.get_calendar_tasks_for_user(user.id).unwrap();
        assert_eq!(meetings.len(), 1);
        assert_eq!(meetings[0].calendar_event_id, None);
    }

    #[tokio::test]
    async fn rerun_for_same_message_does_not_duplicate_rows() {
        let state = test_state();
        let user = seed_user(&state, "a@x.com");
        seed_bot(&state, user.id, "boss@corp.com", BotFlags::all());

        let mut completion = FakeCompletion::default();
        completion.by_schema.insert(
            "summarize_email",
            r#"{"summary": "ok", "priority_score": 10}"#.to_string(),
        );
        completion.by_schema.insert(
            "extract_items",
            r#"{"tasks": [{"description": "One thing"}]}"#.to_string(),
        );

        let email = sample_email("m1", "boss@corp.com");
        let p = providers(FakeMailbox::default(), FakeCalendar::working(), completion);
        process_message(&state, &p, &user, &email).await;
        process_message(&state, &p, &user, &email).await;

        assert_eq!(state.bot_repository.get_summaries_for_user(user.id).unwrap().len(), 1);
        assert_eq!(state.task_repository.get_tasks_for_user(user.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn first_matching_bot_by_creation_order_wins() {
        let state = test_state();
        let user = seed_user(&state, "a@x.com");
        let first = seed_bot(&state, user.id, "boss@corp.com", BotFlags::extract_all());
        let _second = seed_bot(&state, user.id, "boss@corp.com", BotFlags::all());

        let resolved = state
            .bot_repository
            .find_bot_for_sender(user.id, "boss@corp.com")
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, first.id);
    }
}
