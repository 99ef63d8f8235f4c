use uubdaq_lib::UubSettings;
use uubdaq_lib::settings::TriggerSource;

#[test]
fn write_config_file() {
  let dir      = tempfile::tempdir().unwrap();
  let settings = UubSettings::new();
  println!("{}", settings);
  let path = dir.path().join("uubdaq-config-test");
  settings.to_toml(path.to_string_lossy().into_owned());
  assert!(dir.path().join("uubdaq-config-test.toml").exists());
}

#[test]
fn read_config_file() {
  let dir          = tempfile::tempdir().unwrap();
  let path         = dir.path().join("uubdaq-config-test.toml");
  let filename     = path.to_string_lossy().into_owned();
  let mut settings = UubSettings::new();
  settings.stream.server         = String::from("127.0.0.1");
  settings.trigger.source        = TriggerSource::SingleBin;
  settings.trigger.enable_mask   = Some(0x3);
  settings.readout.max_wait_ticks = 0;
  settings.to_toml(filename.clone());
  let read_back = UubSettings::from_toml(filename).unwrap();
  assert_eq!(read_back, settings);
}

#[test]
fn read_missing_config_file() {
  let dir  = tempfile::tempdir().unwrap();
  let path = dir.path().join("does-not-exist.toml");
  assert!(UubSettings::from_toml(path.to_string_lossy().into_owned()).is_err());
  assert_eq!(UubSettings::load(None).unwrap(), UubSettings::new());
}

#[test]
fn read_garbage_config_file() {
  let dir  = tempfile::tempdir().unwrap();
  let path = dir.path().join("garbage.toml");
  std::fs::write(&path, "[stream\nserver = ").unwrap();
  assert!(UubSettings::from_toml(path.to_string_lossy().into_owned()).is_err());
}
