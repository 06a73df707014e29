//! Read-only discovery scripts issued to managed hosts
//!
//! Output grammars for each script live next to their parser in `parse`.

use crate::DriveLetter;

use super::CommandParameters;

/// Block devices with filesystem and mountpoint as JSON, partitions under `children`
pub fn block_device_listing() -> CommandParameters {
    CommandParameters::commands(["lsblk -J -o NAME,FSTYPE,MOUNTPOINT"])
}

/// Drive letter of every partition, one per line
pub fn drive_letter_listing() -> CommandParameters {
    CommandParameters::commands(["Get-Partition | Select-Object -ExpandProperty DriveLetter"])
}

/// Whole disks with their serial numbers
pub fn disk_serial_listing() -> CommandParameters {
    CommandParameters::commands(["lsblk -d -n -o NAME,SERIAL"])
}

/// Serial number of the disk backing `drive`, truncated at the first `_`
pub fn drive_serial_lookup(drive: DriveLetter) -> CommandParameters {
    CommandParameters::commands([
        format!("$a = Get-Partition -DriveLetter {drive} | Select-Object -ExpandProperty DiskNumber"),
        "$b = iex 'Get-Disk -Number $($a)' | Select-Object -ExpandProperty SerialNumber".to_string(),
        "$c = $b -split '_'".to_string(),
        "$c[0]".to_string(),
    ])
}
