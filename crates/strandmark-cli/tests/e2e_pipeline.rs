//! End-to-end block flow: evaluator with a mock grader, runner timers,
//! progress events and response persistence working together.

use std::sync::Arc;
use std::time::Duration;

use strandmark_core::block::{BlockConfig, BlockState, QuestionBlock};
use strandmark_core::evaluator::Evaluator;
use strandmark_core::model::{Answer, GradedBy, Level, McqOption, Question, QuestionKind};
use strandmark_core::progress::{ChannelSink, ProgressEvent, ProgressStore, StrandProgress};
use strandmark_core::runner::{BlockRunner, SubmitOutcome};
use strandmark_core::store::{MemoryStore, ResponseFilter};
use strandmark_core::traits::ResponseStore;
use strandmark_graders::mock::MockGrader;

fn mcq(id: &str) -> Question {
    Question {
        id: id.into(),
        level: Level::Eight,
        points: 8,
        prompt: "Which quantity is conserved in every collision?".into(),
        strand: "forces".into(),
        concept: "momentum".into(),
        keywords: vec!["momentum".into()],
        kind: QuestionKind::Mcq {
            options: vec![
                McqOption {
                    id: "a".into(),
                    text: "Momentum".into(),
                    is_correct: true,
                    level: None,
                },
                McqOption {
                    id: "b".into(),
                    text: "Kinetic energy".into(),
                    is_correct: false,
                    level: Some(4),
                },
            ],
        },
    }
}

fn short_answer(id: &str) -> Question {
    Question {
        id: id.into(),
        level: Level::Eight,
        points: 8,
        prompt: "Explain why a car needs a longer distance to stop on ice.".into(),
        strand: "forces".into(),
        concept: "friction".into(),
        keywords: vec![],
        kind: QuestionKind::ShortAnswer {
            min_words: Some(5),
            max_words: None,
            required_keywords: vec!["friction".into()],
            required_concepts: vec![],
        },
    }
}

#[tokio::test(start_paused = true)]
async fn mastered_block_earns_badge_and_persists() {
    let grader = Arc::new(MockGrader::with_fixed_verdict(8, "Clear and complete."));
    let evaluator = Evaluator::with_grader(grader.clone(), Duration::from_secs(8));
    let (sink, mut events) = ChannelSink::new();
    let progress = Arc::new(ProgressStore::new(
        StrandProgress::with_defaults(),
        Arc::new(sink),
    ));
    let store = Arc::new(MemoryStore::new());

    let config = BlockConfig::default();
    let block = QuestionBlock::new(
        "default/forces/8",
        "default",
        "forces",
        Level::Eight,
        vec![mcq("f8-mcq"), short_answer("f8-short")],
        &config,
    )
    .unwrap();
    let runner = BlockRunner::new(
        block,
        config,
        evaluator,
        Arc::clone(&progress),
        Some(store.clone()),
    );
    let mut status = runner.subscribe();

    let first = runner
        .submit(0, Answer::Choice("a".into()))
        .await
        .unwrap();
    assert!(matches!(first, SubmitOutcome::Feedback(ref r) if r.score == 8));
    status
        .wait_for(|s| s.state == BlockState::Active(1))
        .await
        .unwrap();

    let second = runner
        .submit(
            1,
            Answer::Text("There is much less friction between the tyres and ice.".into()),
        )
        .await
        .unwrap();
    match second {
        SubmitOutcome::Feedback(response) => {
            assert_eq!(response.graded_by, GradedBy::External("mock".into()));
            assert!(response.is_correct);
        }
        SubmitOutcome::Discarded => panic!("response was discarded"),
    }
    status
        .wait_for(|s| s.state == BlockState::Completed)
        .await
        .unwrap();

    let summary = runner.summary().unwrap();
    assert_eq!(summary.reported_score(), 8);
    assert!(summary.next_level_unlocked);
    assert_eq!(grader.call_count(), 1);

    assert_eq!(
        events.recv().await,
        Some(ProgressEvent::ProgressUpdated {
            strand: "forces".into(),
            level: Some(Level::Eight),
            score: 8,
        })
    );
    assert_eq!(
        events.recv().await,
        Some(ProgressEvent::BadgeEarned {
            badge: "Force Master".into(),
        })
    );
    assert_eq!(progress.overall_progress(), 25);

    let saved = store
        .load_responses(&ResponseFilter::block("default", "forces", Level::Eight))
        .await
        .unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved["f8-short"].feedback, "Clear and complete. 8/8 points.");
}

#[tokio::test(start_paused = true)]
async fn failing_grader_falls_back_and_keeps_block_locked() {
    let evaluator = Evaluator::with_grader(Arc::new(MockGrader::failing()), Duration::from_secs(8));
    let progress = Arc::new(ProgressStore::new(
        StrandProgress::with_defaults(),
        Arc::new(strandmark_core::progress::NoopSink),
    ));

    let block = QuestionBlock::new(
        "default/forces/8",
        "default",
        "forces",
        Level::Eight,
        vec![short_answer("f8-short")],
        &BlockConfig::instant(),
    )
    .unwrap();
    let runner = BlockRunner::new(
        block,
        BlockConfig::instant(),
        evaluator,
        Arc::clone(&progress),
        None,
    );
    let mut status = runner.subscribe();

    let outcome = runner
        .submit(0, Answer::Text("The car slides because the road is slippery.".into()))
        .await
        .unwrap();
    let SubmitOutcome::Feedback(response) = outcome else {
        panic!("response was discarded");
    };
    assert_eq!(response.graded_by, GradedBy::Fallback);
    assert_eq!(response.score, 3);

    status
        .wait_for(|s| s.state == BlockState::Completed)
        .await
        .unwrap();
    let summary = runner.summary().unwrap();
    assert!(!summary.next_level_unlocked);
    assert_eq!(progress.best_score("forces"), Some(3));
}
