mod common;
mod rental_flow;
mod rollover_job;
