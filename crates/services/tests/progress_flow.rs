//! End-to-end flows through `ProgressService` against in-memory storage.

use std::sync::Arc;

use async_trait::async_trait;

use hub_core::Badge;
use hub_core::model::{GradedAnswer, Lesson, LessonId, QuizQuestion, UserId};
use hub_core::time::fixed_clock;
use services::{
    AnswerGrader, GraderError, KeywordGrader, ProgressService, ProgressServiceError,
};
use storage::{InMemoryRepository, ProgressRepository, Storage};

fn plain_lesson(id: u64, order: u32) -> Lesson {
    Lesson::new(LessonId::new(id), order, format!("Lesson {order}"), vec![]).unwrap()
}

fn question(text: &str, keyword: &str) -> QuizQuestion {
    QuizQuestion::new(
        text,
        keyword,
        vec![keyword.to_owned()],
        format!("Because {keyword}."),
        format!("Think about {keyword}."),
    )
}

/// Storage seeded with `count` plain lessons, orders 1..=count.
fn seeded_storage(count: u32) -> (Storage, InMemoryRepository) {
    let repo = InMemoryRepository::new();
    for order in 1..=count {
        repo.insert_lesson(plain_lesson(u64::from(order), order)).unwrap();
    }
    let storage = Storage {
        progress: Arc::new(repo.clone()),
        lessons: Arc::new(repo.clone()),
    };
    (storage, repo)
}

struct FailingGrader;

#[async_trait]
impl AnswerGrader for FailingGrader {
    async fn grade(
        &self,
        _question: &QuizQuestion,
        _answer: &str,
    ) -> Result<GradedAnswer, GraderError> {
        Err(GraderError::EmptyResponse)
    }
}

#[tokio::test]
async fn first_five_lessons_earn_apprentice_and_its_reward() {
    let (storage, _) = seeded_storage(30);
    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();

    let mut last = None;
    for order in 1..=5 {
        last = Some(service.complete_lesson(user, order, None).await.unwrap());
    }
    let delta = last.unwrap();

    assert_eq!(delta.current_lesson, 6);
    assert_eq!(delta.completed_lessons, vec![1, 2, 3, 4, 5]);
    assert!(delta.unlocked_lessons.contains(&6));
    assert!(delta.badges.contains(&Badge::Apprentice));
    assert!(delta.newly_awarded.contains(&Badge::Apprentice));
    assert_eq!(delta.newly_unlocked_rewards, vec![101]);
    assert!(delta.unlocked_lessons.contains(&101));
    assert_eq!(delta.completion_percentage, 17);
    assert!(!delta.training_complete);
}

#[tokio::test]
async fn badges_are_announced_exactly_once() {
    let (storage, _) = seeded_storage(30);
    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();

    let first = service.complete_lesson(user, 1, None).await.unwrap();
    assert!(first.newly_awarded.contains(&Badge::JoinedHub));
    assert!(first.newly_awarded.contains(&Badge::FirstLessonComplete));

    let second = service.complete_lesson(user, 2, None).await.unwrap();
    assert!(second.newly_awarded.is_empty());
    assert!(second.badges.contains(&Badge::JoinedHub));
}

#[tokio::test]
async fn repeating_a_lesson_changes_nothing() {
    let (storage, _) = seeded_storage(30);
    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();

    let first = service.complete_lesson(user, 2, None).await.unwrap();
    assert!(first.newly_completed);

    let again = service.complete_lesson(user, 2, None).await.unwrap();
    assert!(!again.newly_completed);
    assert_eq!(again.completed_lessons, first.completed_lessons);
    assert_eq!(again.streak_count, first.streak_count);
    assert!(again.newly_awarded.is_empty());
}

#[tokio::test]
async fn final_lesson_marks_training_complete_until_catalog_grows() {
    let (storage, repo) = seeded_storage(30);
    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();

    let delta = service.complete_lesson(user, 30, None).await.unwrap();
    assert!(delta.training_complete);
    assert!(!delta.unlocked_lessons.contains(&31));

    repo.insert_lesson(plain_lesson(31, 31)).unwrap();

    let delta = service.complete_lesson(user, 30, None).await.unwrap();
    assert!(!delta.training_complete);
    assert!(delta.unlocked_lessons.contains(&31));
    assert_eq!(delta.current_lesson, 31);
}

#[tokio::test]
async fn passing_quiz_records_the_completion() {
    let (storage, repo) = seeded_storage(3);
    let quiz = vec![
        question("Q1", "whisk"),
        question("Q2", "fold"),
        question("Q3", "sear"),
        question("Q4", "braise"),
        question("Q5", "poach"),
    ];
    repo.insert_lesson(Lesson::new(LessonId::new(10), 1, "Basics", quiz).unwrap())
        .unwrap();

    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();
    let answers: Vec<String> = ["whisk", "fold", "sear", "braise", "no idea"]
        .into_iter()
        .map(str::to_owned)
        .collect();

    let outcome = service
        .submit_quiz(user, LessonId::new(10), &answers, &KeywordGrader)
        .await
        .unwrap();

    assert!(outcome.passed);
    assert!(!outcome.all_correct);
    assert_eq!(outcome.quiz_score, 80);
    assert_eq!(outcome.grading.len(), 5);

    let progress = outcome.progress.expect("pass should record completion");
    assert!(progress.newly_completed);
    assert_eq!(progress.completed_lessons, vec![1]);
}

#[tokio::test]
async fn perfect_quiz_awards_perfect_score_and_its_reward() {
    let (storage, repo) = seeded_storage(3);
    let quiz = vec![question("Q1", "whisk"), question("Q2", "fold")];
    repo.insert_lesson(Lesson::new(LessonId::new(10), 1, "Basics", quiz).unwrap())
        .unwrap();

    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();
    let answers = vec!["whisk it".to_owned(), "gently fold".to_owned()];

    let outcome = service
        .submit_quiz(user, LessonId::new(10), &answers, &KeywordGrader)
        .await
        .unwrap();

    assert!(outcome.all_correct);
    assert_eq!(outcome.quiz_score, 100);
    let progress = outcome.progress.unwrap();
    assert!(progress.newly_awarded.contains(&Badge::PerfectScore));
    assert!(progress.newly_unlocked_rewards.contains(&99));
}

#[tokio::test]
async fn failing_quiz_leaves_progress_untouched() {
    let (storage, repo) = seeded_storage(3);
    let quiz = vec![
        question("Q1", "whisk"),
        question("Q2", "fold"),
        question("Q3", "sear"),
        question("Q4", "braise"),
        question("Q5", "poach"),
    ];
    repo.insert_lesson(Lesson::new(LessonId::new(10), 1, "Basics", quiz).unwrap())
        .unwrap();

    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();
    let answers: Vec<String> = ["whisk", "fold", "sear", "wrong", "wrong"]
        .into_iter()
        .map(str::to_owned)
        .collect();

    let outcome = service
        .submit_quiz(user, LessonId::new(10), &answers, &KeywordGrader)
        .await
        .unwrap();

    assert!(!outcome.passed);
    assert_eq!(outcome.quiz_score, 60);
    assert!(outcome.progress.is_none());
    assert!(storage.progress.load(user).await.unwrap().is_none());
}

#[tokio::test]
async fn broken_grader_fails_closed() {
    let (storage, repo) = seeded_storage(3);
    let quiz = vec![question("Q1", "whisk"), question("Q2", "fold")];
    repo.insert_lesson(Lesson::new(LessonId::new(10), 1, "Basics", quiz).unwrap())
        .unwrap();

    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();
    let answers = vec!["whisk".to_owned(), "fold".to_owned()];

    let outcome = service
        .submit_quiz(user, LessonId::new(10), &answers, &FailingGrader)
        .await
        .unwrap();

    assert!(!outcome.passed);
    assert_eq!(outcome.quiz_score, 0);
    assert!(outcome.grading.iter().all(|g| !g.correct));
    assert!(outcome.progress.is_none());
}

#[tokio::test]
async fn unanswered_questions_count_against_the_score() {
    let (storage, repo) = seeded_storage(3);
    let quiz = vec![
        question("Q1", "whisk"),
        question("Q2", "fold"),
        question("Q3", "sear"),
    ];
    repo.insert_lesson(Lesson::new(LessonId::new(10), 1, "Basics", quiz).unwrap())
        .unwrap();

    let service = ProgressService::new(&storage, fixed_clock());
    let outcome = service
        .submit_quiz(
            UserId::random(),
            LessonId::new(10),
            &["whisk".to_owned()],
            &KeywordGrader,
        )
        .await
        .unwrap();

    assert_eq!(outcome.grading.len(), 3);
    assert!(!outcome.passed);
    assert_eq!(outcome.quiz_score, 33);
}

#[tokio::test]
async fn unknown_lesson_and_empty_quiz_are_rejected() {
    let (storage, repo) = seeded_storage(3);
    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();

    let err = service
        .submit_quiz(user, LessonId::new(99), &["a".to_owned()], &KeywordGrader)
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressServiceError::LessonNotFound));

    // Lesson 1 exists but has no quiz authored.
    let err = service
        .submit_quiz(user, LessonId::new(1), &["a".to_owned()], &KeywordGrader)
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressServiceError::EmptyQuiz));

    let quiz = vec![question("Q1", "whisk")];
    repo.insert_lesson(Lesson::new(LessonId::new(10), 1, "Basics", quiz).unwrap())
        .unwrap();
    let err = service
        .submit_quiz(user, LessonId::new(10), &[], &KeywordGrader)
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressServiceError::EmptyQuiz));
}

#[tokio::test]
async fn concurrent_completions_converge_on_one_membership() {
    let (storage, _) = seeded_storage(30);
    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();

    let a = service.clone();
    let b = service.clone();
    let (left, right) = tokio::join!(
        tokio::spawn(async move { a.complete_lesson(user, 7, None).await }),
        tokio::spawn(async move { b.complete_lesson(user, 7, None).await }),
    );
    let left = left.unwrap().unwrap();
    let right = right.unwrap().unwrap();

    // Exactly one writer observes the first-time completion, and badges are
    // announced once across both.
    assert_eq!(
        [&left, &right].iter().filter(|d| d.newly_completed).count(),
        1
    );
    let announced: usize = [&left, &right]
        .iter()
        .map(|d| {
            usize::from(d.newly_awarded.contains(&Badge::FirstLessonComplete))
        })
        .sum();
    assert_eq!(announced, 1);

    let stored = storage.progress.load(user).await.unwrap().unwrap();
    assert_eq!(stored.completed_lessons().iter().copied().collect::<Vec<_>>(), vec![7]);
    assert!(stored.version() >= 2);
}

#[tokio::test]
async fn invalid_inputs_never_touch_storage() {
    let (storage, _) = seeded_storage(3);
    let service = ProgressService::new(&storage, fixed_clock());
    let user = UserId::random();

    let err = service.complete_lesson(user, 0, None).await.unwrap_err();
    assert!(matches!(err, ProgressServiceError::Progress(_)));

    let err = service.complete_lesson(user, 1, Some(101)).await.unwrap_err();
    assert!(matches!(err, ProgressServiceError::Progress(_)));

    assert!(storage.progress.load(user).await.unwrap().is_none());
}
