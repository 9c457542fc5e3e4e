mod environment;
mod settings;

pub use environment::Environment;
pub use settings::{
    AssistantSettings, ChatSettings, ClassificationSettings, ClassifierSettings, DatabaseSettings,
    LoggingSettings, ServerSettings, Settings,
};
