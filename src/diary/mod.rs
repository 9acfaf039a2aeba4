pub mod dto;
mod mutation;
pub mod nutrition;
pub mod repo;
pub mod store;

pub use dto::{parse_date, DiaryRecord, MealId, MealType, UserScope};
pub use mutation::MutationKind;
pub use nutrition::{totals_for, NutritionGoals, Targets, Totals};
pub use repo::PgPersistence;
pub use store::{MutationStore, Reconciliation, StoreError};
