pub mod provider;

pub use provider::ConfigProvider;
