pub mod audit;
pub mod supabase;

pub use supabase::{representation_headers, DbError, SupabaseClient};
