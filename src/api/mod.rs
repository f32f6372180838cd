pub mod routes;

// Re-export route handlers for convenience
pub use routes::academic_years;
pub use routes::admin;
pub use routes::app;
pub use routes::attendance;
pub use routes::auth;
pub use routes::classes;
pub use routes::guru;
pub use routes::homerooms;
pub use routes::notifications;
pub use routes::qr;
pub use routes::settings;
pub use routes::siswa;
pub use routes::state;
pub use routes::students;
pub use routes::teachers;
