mod auditing;
mod common;
mod routing;
