//! # Pick and Place Executable
//!
//! Moves each configured part from the first station to the second and back, accounting for the
//! energy used along the way.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Result};
use log::info;
use structopt::StructOpt;

use tlm_lib::{
    params::PickPlaceParams,
    reading::LiveSource,
    robot_client::{RobotClient, RobotLink},
    sequencer::Sequencer,
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
#[structopt(name = "pick_place", about = "Pick and place sequence")]
struct Opt {
    /// Parameter file, relative to the params directory
    #[structopt(long, default_value = "pick_place.toml")]
    params: String,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    let session = Session::new("pick_place", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Pick and Place Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname()
            .wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    let params: PickPlaceParams = util::params::load(&opt.params)
        .wrap_err("Could not load pick_place params")?;
    params.are_valid().wrap_err("Invalid pick_place params")?;

    let mut robot = RobotClient::connect(&params.robot)
        .wrap_err("Failed to connect to the robot")?;
    info!("Connected to the robot at {}", params.robot.address());

    info!("Current joint pose: {:?}", robot.get_curjpos()?);

    let reader = LiveSource::connect(&params.reader)
        .wrap_err("Failed to connect the reader")?;

    let mut sequencer = Sequencer::new(robot, reader, params);

    let report = sequencer.run().wrap_err("Pick and place sequence failed")?;

    info!(
        "Completed {} moves, total cost {:.6}",
        report.num_moves, report.cumulative_cost
    );

    Ok(())
}
