//! # Telemetry Executable
//!
//! Polls the robot for its state at a fixed cadence, derives velocity, acceleration and energy
//! cost, and publishes the result to telemetry subscribers.
//!
//! # Usage
//!
//! ```text
//! tlm_exec [--params <file>] [--replay <csv> [--no-wrap]]
//! ```
//!
//! Without `--replay` the robot described in the parameter file is queried directly.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::info;
use std::path::PathBuf;
use structopt::StructOpt;

// Internal
use tlm_lib::{
    params::TlmExecParams,
    reading::{LiveSource, ReadingSource, ReplaySource},
    tlm_loop::TlmLoop,
    tlm_server::TlmServer,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "tlm_exec", about = "Robot telemetry publisher")]
struct Opt {
    /// Parameter file, relative to the params directory
    #[structopt(long, default_value = "tlm_exec.toml")]
    params: String,

    /// Replay readings from a recorded CSV file instead of querying the robot
    #[structopt(long, parse(from_os_str))]
    replay: Option<PathBuf>,

    /// Stop once the replay file is exhausted rather than starting again from the first row
    #[structopt(long)]
    no_wrap: bool,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("tlm_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Robot Telemetry Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname()
            .wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: TlmExecParams = util::params::load(&opt.params)
        .wrap_err("Could not load tlm_exec params")?;
    params.are_valid().wrap_err("Invalid tlm_exec params")?;

    info!("Parameters loaded");

    // ---- READING SOURCE ----

    let source: Box<dyn ReadingSource> = match opt.replay {
        Some(ref path) => {
            let src = ReplaySource::new(path, !opt.no_wrap)
                .wrap_err("Failed to load the replay file")?;
            info!("Replaying {} readings from {:?}", src.len(), path);
            Box::new(src)
        }
        None => {
            if opt.no_wrap {
                return Err(eyre!("--no-wrap can only be used with --replay"));
            }
            Box::new(
                LiveSource::connect(&params.robot)
                    .wrap_err("Failed to connect to the robot")?,
            )
        }
    };

    // ---- NETWORK ----

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let tlm_server = TlmServer::new(&zmq_ctx, &params.broker)
        .wrap_err("Failed to initialise TlmServer")?;
    info!("TlmServer initialised");

    // ---- MAIN LOOP ----

    let mut tlm_loop = TlmLoop::new(
        source,
        tlm_server,
        &params.broker.topic,
        params.tariff,
        params.tlm_loop.clone(),
    );

    tlm_loop.run().wrap_err("Telemetry loop failed")?;

    // ---- SHUTDOWN ----

    info!("End of execution");

    Ok(())
}
