use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Compute device named by the `gpu_ids` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Accelerator(usize),
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Device, Error> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("cpu") {
            return Ok(Device::Cpu);
        }
        let index = s.strip_prefix("cuda:").unwrap_or(s);
        index.parse::<usize>()
            .map(Device::Accelerator)
            .map_err(|_| Error::InvalidDevice(s.to_string()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(i) => write!(f, "cuda:{i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_accelerator_selections() {
        assert_eq!("".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("1".parse::<Device>().unwrap(), Device::Accelerator(1));
        assert_eq!("cuda:0".parse::<Device>().unwrap().to_string(), "cuda:0");
        assert!(matches!("gpu".parse::<Device>(), Err(Error::InvalidDevice(_))));
    }
}
