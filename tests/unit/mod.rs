mod provider_router_test;

// Unit tests for API
mod auth_test;
