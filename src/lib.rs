pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod state;

pub mod crypto {
    pub mod credentials;
    pub mod nonce;
    pub mod signer;
}

pub mod models {
    pub mod session;
}

pub mod services {
    pub mod rate_limit;
    pub mod revalidation;
    pub mod session;
}

pub mod handlers {
    pub mod admin;
    pub mod auth;
    pub mod health;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}
