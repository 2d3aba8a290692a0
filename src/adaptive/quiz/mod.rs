pub mod analysis;
pub mod suggestions;

pub use analysis::{
    analyze, calculate_difficulty_adjustment, select_questions_for_difficulty, DifficultyAdjustment,
    Question, QuestionOutcome, Quiz, QuizAnalysis, QuizResult,
};
pub use suggestions::{check_seen_concepts, generate_review_suggestions, ReviewSuggestion, SeenConcept};
