use std::fs;

use tracing::info;
use tracing_subscriber::EnvFilter;

use eobands::api::Session;
use eobands::core::context::Context;
use eobands::core::params::{parse_size, LoadRequest, StackRequest};
use eobands::reader::Reader;

use super::args::CliArgs;
use super::errors::AppError;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.log {
        init_logging();
    }

    let ctx = Context::from_env();
    let reader = Reader::new(ctx.config.clone()).map_err(AppError::from)?;
    let product = reader
        .open(&args.input, args.archive.as_deref(), args.output.as_deref())
        .map_err(AppError::from)?;
    let session = Session::with_context(product, ctx);

    if args.info {
        let summary = session.summary().map_err(AppError::from)?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if args.bands.is_empty() {
        return Err(AppError::MissingArgument {
            arg: "--bands".to_string(),
        }
        .into());
    }
    let size = args
        .size
        .as_deref()
        .map(parse_size)
        .transpose()
        .map_err(AppError::from)?;
    let load = LoadRequest {
        bands: args.bands.clone(),
        resolution: args.resolution,
        size,
    };

    match args.stack {
        Some(path) => {
            let request = StackRequest {
                load,
                output: Some(path.clone()),
                as_int: args.as_int,
                sidecar: args.sidecar,
            };
            let raster = session.stack(&request).map_err(AppError::from)?;
            info!(
                "Stacked {} band(s) of {}x{} into {:?}",
                raster.meta.count, raster.meta.width, raster.meta.height, path
            );
            println!("{}", path.display());
        }
        None => {
            let output = args.output.ok_or(AppError::MissingArgument {
                arg: "--output or --stack".to_string(),
            })?;
            fs::create_dir_all(&output).map_err(AppError::from)?;
            let result = session.load(&load).map_err(AppError::from)?;
            for path in session.write_bands(&result, &output).map_err(AppError::from)? {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}
