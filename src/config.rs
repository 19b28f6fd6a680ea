use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub model_dir: String,
}

impl Config {
    pub fn load() -> Self {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse()
            .unwrap_or(3001);

        let model_dir = env::var("MODEL_DIR").unwrap_or_else(|_| "models".to_string());

        Config { port, model_dir }
    }
}
