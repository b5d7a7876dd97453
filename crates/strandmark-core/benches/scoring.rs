use criterion::{black_box, criterion_group, criterion_main, Criterion};

use strandmark_core::evaluator::{bucket_score, evaluate_match_click, score_short_answer_locally};
use strandmark_core::model::{Level, MatchPair, Question, QuestionKind};

fn question(level: Level, kind: QuestionKind) -> Question {
    Question {
        id: "bench".into(),
        level,
        points: u32::from(level.points()),
        prompt: "bench".into(),
        strand: "energy".into(),
        concept: String::new(),
        keywords: vec![],
        kind,
    }
}

fn match_question(n: usize) -> (Question, Vec<MatchPair>) {
    let left: Vec<String> = (0..n).map(|i| format!("term-{i}")).collect();
    let right: Vec<String> = (0..n).map(|i| format!("definition-{i}")).collect();
    let pairs: Vec<MatchPair> = left
        .iter()
        .zip(&right)
        .map(|(l, r)| MatchPair::new(l.as_str(), r.as_str()))
        .collect();
    // Submitted in reverse with every third pair wrong.
    let submitted = pairs
        .iter()
        .rev()
        .enumerate()
        .map(|(i, p)| {
            if i % 3 == 0 {
                MatchPair::new(p.left.as_str(), "wrong")
            } else {
                p.clone()
            }
        })
        .collect();
    (
        question(Level::Eight, QuestionKind::MatchClick { left, right, pairs }),
        submitted,
    )
}

fn bench_bucket_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_score");

    group.bench_function("7_of_10", |b| {
        b.iter(|| bucket_score(black_box(8), black_box(7), black_box(10)))
    });

    group.bench_function("sweep_100", |b| {
        b.iter(|| {
            (0..=100)
                .map(|correct| u32::from(bucket_score(8, correct, 100)))
                .sum::<u32>()
        })
    });

    group.finish();
}

fn bench_match_click(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_click");

    for n in [4, 16, 64] {
        let (q, submitted) = match_question(n);
        group.bench_function(format!("pairs={n}"), |b| {
            b.iter(|| evaluate_match_click(black_box(&q), black_box(&submitted)))
        });
    }

    group.finish();
}

fn bench_short_answer(c: &mut Criterion) {
    let q = question(
        Level::Six,
        QuestionKind::ShortAnswer {
            min_words: Some(15),
            max_words: Some(120),
            required_keywords: vec!["friction".into(), "force".into(), "surface".into()],
            required_concepts: vec!["energy transfer".into(), "heat".into()],
        },
    );
    let answer = "When the ball rolls across the carpet the friction force between the \
                  ball and the surface slows it down, and some of its kinetic energy is \
                  turned into heat, which is an energy transfer to the surroundings.";

    c.bench_function("short_answer_local", |b| {
        b.iter(|| score_short_answer_locally(black_box(&q), black_box(answer)))
    });
}

criterion_group!(
    benches,
    bench_bucket_score,
    bench_match_click,
    bench_short_answer
);
criterion_main!(benches);
