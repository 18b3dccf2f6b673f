use anyhow::{format_err, Error};
use stack_string::StackString;
use std::{env::var, ops::Deref, path::Path, sync::Arc};

/// `SyncConfig` holds configuration information which can be set either
/// through environment variables or the config.env file, see the dotenv crate
/// for more information about the config file format.
#[derive(Default, Debug)]
pub struct SyncConfigInner {
    pub home_dir: StackString,
    pub fitbit_clientid: StackString,
    pub fitbit_clientsecret: StackString,
    pub fitbit_tokenfile: StackString,
    pub google_tokenfile: StackString,
    pub start_date: StackString,
    pub end_date: StackString,
    pub weight_log_time: StackString,
    pub sync_steps: bool,
    pub sync_distance: bool,
    pub sync_heartrate: bool,
    pub sync_weight: bool,
    pub sync_body_fat: bool,
    pub sync_calories: bool,
    pub sync_sleep: bool,
    pub sync_activities: bool,
}

#[derive(Default, Debug, Clone)]
pub struct SyncConfig(Arc<SyncConfigInner>);

macro_rules! set_config_parse_default {
    ($s:ident, $id:ident, $d:expr) => {
        $s.$id = var(&stringify!($id).to_uppercase())
            .ok()
            .and_then(|x| x.parse().ok())
            .unwrap_or($d);
    };
}

macro_rules! set_config_from_env {
    ($s:ident, $id:ident) => {
        if let Ok($id) = var(&stringify!($id).to_uppercase()) {
            $s.$id = $id.into()
        }
    };
}

impl SyncConfigInner {
    /// Some variables have natural default values, which we set in the new()
    /// method.
    pub fn new() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| Path::new("/tmp").to_path_buf());

        let fitbit_tokenfile = home_dir
            .join(".fitbit_tokens")
            .to_string_lossy()
            .to_string()
            .into();
        let google_tokenfile = home_dir
            .join(".google_fit_tokens.json")
            .to_string_lossy()
            .to_string()
            .into();

        Self {
            fitbit_tokenfile,
            google_tokenfile,
            weight_log_time: "23:59:59".into(),
            sync_steps: true,
            sync_distance: true,
            sync_heartrate: true,
            sync_weight: true,
            sync_body_fat: true,
            sync_calories: true,
            sync_sleep: true,
            sync_activities: true,
            home_dir: home_dir.to_string_lossy().to_string().into(),
            ..Self::default()
        }
    }

    /// Each variable maps to an environment variable, if the variable exists,
    /// use it.
    pub fn from_env(mut self) -> Self {
        set_config_from_env!(self, fitbit_clientid);
        set_config_from_env!(self, fitbit_clientsecret);
        set_config_from_env!(self, fitbit_tokenfile);
        set_config_from_env!(self, google_tokenfile);
        set_config_from_env!(self, start_date);
        set_config_from_env!(self, end_date);
        set_config_from_env!(self, weight_log_time);
        set_config_parse_default!(self, sync_steps, true);
        set_config_parse_default!(self, sync_distance, true);
        set_config_parse_default!(self, sync_heartrate, true);
        set_config_parse_default!(self, sync_weight, true);
        set_config_parse_default!(self, sync_body_fat, true);
        set_config_parse_default!(self, sync_calories, true);
        set_config_parse_default!(self, sync_sleep, true);
        set_config_parse_default!(self, sync_activities, true);
        self
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self(Arc::new(SyncConfigInner::new()))
    }

    /// Pull configuration from a file if it exists,
    /// first look for a config.env file in the current directory,
    /// then try `${HOME}/.config/fitbit_gfit_sync/config.env`,
    /// if that doesn't exist fall back on the default behaviour of dotenv.
    pub fn get_config(fname: Option<&str>) -> Result<Self, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| format_err!("No CONFIG directory"))?;
        let default_fname = config_dir.join("fitbit_gfit_sync").join("config.env");

        let env_file = match fname.map(Path::new) {
            Some(fname) if fname.exists() => fname,
            _ => &default_fname,
        };

        dotenv::dotenv().ok();

        if env_file.exists() {
            dotenv::from_path(env_file).ok();
        } else if Path::new("config.env").exists() {
            dotenv::from_filename("config.env").ok();
        }

        let conf = SyncConfigInner::new().from_env();

        if conf.fitbit_clientid.as_str() == "" {
            Err(format_err!("No FITBIT_CLIENTID specified"))
        } else if conf.fitbit_clientsecret.as_str() == "" {
            Err(format_err!("No FITBIT_CLIENTSECRET specified"))
        } else {
            Ok(Self(Arc::new(conf)))
        }
    }
}

impl Deref for SyncConfig {
    type Target = SyncConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
