use std::path::PathBuf;

#[derive(Clone)]
pub struct AppConfig {
    pub root_path: PathBuf,
    pub port: u16,
    pub retry_attempts: u32,
    pub retry_delay_secs: f64,
    pub confidence_threshold: f32,
    pub face_tolerance: f32,
    pub image_extensions: Vec<String>,
    pub scan_on_start: bool,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub trace_spans: bool,
}

pub struct AppConfigOverrides {
    pub root: Option<PathBuf>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub retry_attempts: Option<u32>,
    pub retry_delay: Option<f64>,
    pub confidence_threshold: Option<f32>,
    pub face_tolerance: Option<f32>,
    pub no_scan: bool,
    pub trace_spans: bool,
}

impl AppConfig {
    pub fn load_from(path: Option<PathBuf>) -> Self {
        let mut builder = config::Config::builder();
        let path = match path {
            Some(p) => p,
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".naspicz")
                .join("config.toml"),
        };
        builder = builder.add_source(config::File::from(path).required(false));
        let cfg = builder.build().unwrap_or_default();

        let root_path = cfg
            .get_string("root_path")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let port = cfg.get_int("port").unwrap_or(8080) as u16;
        let retry_attempts = cfg.get_int("retry_attempts").unwrap_or(3) as u32;
        let retry_delay_secs = cfg.get_float("retry_delay_secs").unwrap_or(1.0);
        let confidence_threshold = cfg.get_float("confidence_threshold").unwrap_or(0.5) as f32;
        let face_tolerance = cfg.get_float("face_tolerance").unwrap_or(0.6) as f32;
        let image_extensions = cfg
            .get_array("image_extensions")
            .ok()
            .map(|values| {
                values
                    .into_iter()
                    .filter_map(|value| value.into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        let scan_on_start = cfg.get_bool("scan_on_start").unwrap_or(true);
        let log_level = cfg
            .get_string("log_level")
            .unwrap_or_else(|_| "info".to_string());
        let log_file = cfg.get_string("log_file").map(PathBuf::from).ok();
        let trace_spans = cfg.get_bool("trace_spans").unwrap_or(false);

        Self {
            root_path,
            port,
            retry_attempts,
            retry_delay_secs,
            confidence_threshold,
            face_tolerance,
            image_extensions,
            scan_on_start,
            log_level,
            log_file,
            trace_spans,
        }
    }

    pub fn apply_overrides(mut self, ov: &AppConfigOverrides) -> Self {
        if let Some(root) = &ov.root {
            self.root_path = root.clone();
        }
        if let Some(port) = ov.port {
            self.port = port;
        }
        if let Some(level) = &ov.log_level {
            self.log_level = level.clone();
        }
        if let Some(attempts) = ov.retry_attempts {
            self.retry_attempts = attempts;
        }
        if let Some(delay) = ov.retry_delay {
            self.retry_delay_secs = delay;
        }
        if let Some(threshold) = ov.confidence_threshold {
            self.confidence_threshold = threshold;
        }
        if let Some(tolerance) = ov.face_tolerance {
            self.face_tolerance = tolerance;
        }
        if ov.no_scan {
            self.scan_on_start = false;
        }
        if ov.trace_spans {
            self.trace_spans = true;
        }
        self
    }
}
