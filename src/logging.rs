//! Logger initialisation from [`LogConfig`].
//!
//! Two `env_logger` sinks sit behind one [`log::Log`]: records under the
//! [`ACCESS_TARGET`] target go to the access log, everything else to the
//! application log.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::str::FromStr;

use log::{LevelFilter, Log, Metadata, Record};

use crate::config::LogConfig;
use crate::error::{Error, Result};

/// Log target of per-request access lines.
pub const ACCESS_TARGET: &str = "access";

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    Stdout,
    File(String),
}

impl LogOutput {
    pub fn parse(output: &str) -> Self {
        match output.trim() {
            "" | "stderr" => LogOutput::Stderr,
            "stdout" => LogOutput::Stdout,
            path => LogOutput::File(path.to_string()),
        }
    }

    fn open(&self) -> Result<Box<dyn Write + Send>> {
        let out: Box<dyn Write + Send> = match self {
            LogOutput::Stderr => Box::new(io::stderr()),
            LogOutput::Stdout => Box::new(io::stdout()),
            LogOutput::File(path) => Box::new(OpenOptions::new().create(true).append(true).open(path)?),
        };
        Ok(out)
    }
}

/// Writes every line to each of several outputs.
struct Tee(Vec<Box<dyn Write + Send>>);

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for out in &mut self.0 {
            out.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for out in &mut self.0 {
            out.flush()?;
        }
        Ok(())
    }
}

/// Resolve configured outputs into an `env_logger` target.
fn target(outputs: &[String]) -> Result<env_logger::Target> {
    let outputs: Vec<LogOutput> = outputs.iter().map(|o| LogOutput::parse(o)).collect();
    match outputs.as_slice() {
        [] | [LogOutput::Stderr] => Ok(env_logger::Target::Stderr),
        [LogOutput::Stdout] => Ok(env_logger::Target::Stdout),
        [single] => Ok(env_logger::Target::Pipe(single.open()?)),
        many => {
            let sinks = many.iter().map(LogOutput::open).collect::<Result<Vec<_>>>()?;
            Ok(env_logger::Target::Pipe(Box::new(Tee(sinks))))
        }
    }
}

/// Build the application log builder for `config`.
///
/// `RUST_LOG`, when set, overrides the configured level.
pub fn builder(config: &LogConfig) -> Result<env_logger::Builder> {
    let level = LevelFilter::from_str(config.level.trim())
        .map_err(|_| Error::Config(format!("invalid log level: {}", config.level)))?;

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.as_str()),
    );
    builder.target(target(&config.output)?);
    Ok(builder)
}

/// Build the access log builder, if an access destination is configured.
///
/// Access lines carry a timestamp and the message only.
pub fn access_builder(config: &LogConfig) -> Result<Option<env_logger::Builder>> {
    let Some(access) = config.access.as_deref() else {
        return Ok(None);
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(LevelFilter::Off)
        .filter_module(ACCESS_TARGET, LevelFilter::Info)
        .format(|buf, record| {
            let ts = buf.timestamp();
            writeln!(buf, "{} {}", ts, record.args())
        })
        .target(target(&[access.to_string()])?);
    Ok(Some(builder))
}

/// Routes records to the application or access logger by target.
pub struct Dispatch {
    app: env_logger::Logger,
    access: Option<env_logger::Logger>,
}

impl Dispatch {
    /// Build both loggers from `config`.
    pub fn from_config(config: &LogConfig) -> Result<Self> {
        let app = builder(config)?.build();
        let access = access_builder(config)?.map(|mut b| b.build());
        Ok(Self { app, access })
    }

    /// Most verbose level either logger accepts.
    pub fn max_level(&self) -> LevelFilter {
        let access = self.access.as_ref().map_or(LevelFilter::Off, |a| a.filter());
        self.app.filter().max(access)
    }

    fn route(&self, target: &str) -> Option<&env_logger::Logger> {
        if target == ACCESS_TARGET {
            self.access.as_ref()
        } else {
            Some(&self.app)
        }
    }
}

impl Log for Dispatch {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.route(metadata.target())
            .is_some_and(|logger| logger.enabled(metadata))
    }

    fn log(&self, record: &Record<'_>) {
        if let Some(logger) = self.route(record.target()) {
            logger.log(record);
        }
    }

    fn flush(&self) {
        self.app.flush();
        if let Some(access) = &self.access {
            access.flush();
        }
    }
}

/// Install the global logger.
pub fn init(config: &LogConfig) -> Result<()> {
    let dispatch = Dispatch::from_config(config)?;
    let max_level = dispatch.max_level();
    log::set_boxed_logger(Box::new(dispatch))
        .map_err(|e| Error::Config(format!("logger already initialised: {}", e)))?;
    log::set_max_level(max_level);
    Ok(())
}
