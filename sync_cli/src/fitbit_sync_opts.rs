use anyhow::{format_err, Error};
use chrono::NaiveDate;
use stack_string::StackString;
use std::path::PathBuf;
use structopt::StructOpt;

use fitbit_lib::fitbit_client::FitbitClient;
use gfit_lib::gfit_client::GfitClient;
use sync_lib::{sync_config::SyncConfig, sync_util::parse_sync_date};

use crate::fitbit_sync::FitbitSync;

/// Sync fitbit data to google fit
#[derive(StructOpt)]
pub struct FitbitSyncOpts {
    /// First day to sync, a date or "today", "yesterday", "N days ago"
    #[structopt(short = "s", long)]
    start_date: Option<StackString>,
    /// Day after the last day to sync, same formats as start-date
    #[structopt(short = "e", long)]
    end_date: Option<StackString>,
    /// Alternate config.env file
    #[structopt(short = "c", long)]
    config: Option<PathBuf>,
}

impl FitbitSyncOpts {
    pub async fn process_args() -> Result<(), Error> {
        let opts = Self::from_args();
        let config = SyncConfig::get_config(opts.config.as_ref().and_then(|p| p.to_str()))?;

        let start_date = Self::resolve_date(
            opts.start_date.as_ref(),
            &config.start_date,
            "start date",
        )?;
        let end_date =
            Self::resolve_date(opts.end_date.as_ref(), &config.end_date, "end date")?;
        if end_date <= start_date {
            return Err(format_err!(
                "End date {} must fall after start date {}",
                end_date,
                start_date
            ));
        }

        let fitbit = FitbitClient::from_file(config.clone()).await?;
        let gfit = GfitClient::from_file(config.clone()).await?;
        let mut sync = FitbitSync::new(config, fitbit, gfit);

        let result = sync.run(start_date, end_date).await;

        // refreshed tokens are kept even when the sync itself fails,
        // otherwise the next run would start from a revoked token
        sync.fitbit.to_file().await?;
        sync.gfit.to_file().await?;

        result
    }

    fn resolve_date(
        from_opts: Option<&StackString>,
        from_config: &StackString,
        label: &str,
    ) -> Result<NaiveDate, Error> {
        let date_str = match from_opts {
            Some(s) => s.as_str(),
            None if from_config.as_str() != "" => from_config.as_str(),
            None => return Err(format_err!("No {} specified", label)),
        };
        parse_sync_date(date_str)
    }
}
