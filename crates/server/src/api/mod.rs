mod handlers;
mod jobs;
mod routes;
mod ws;

pub use routes::create_router;
