pub mod changes;
pub mod codebase;
pub mod derive;
pub mod ledger;
pub mod paths;
pub mod project;
pub mod prompts;
pub mod session;
pub mod settings;
pub mod transcript;
pub mod util;
pub mod warn;
