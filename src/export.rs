use crate::attendance::format_date;
use crate::error::AbsensiError;
use crate::recap::{RecapFilter, RecapRow};

const HEADER: [&str; 6] = [
    "NISN",
    "Nama Siswa",
    "Kelas",
    "Total Hadir",
    "Total Absen",
    "Total Dicatat",
];

/// Writes recap rows as CSV with a header row.
pub fn recap_to_csv(rows: &[RecapRow]) -> Result<Vec<u8>, AbsensiError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER).map_err(csv_error)?;

    for row in rows {
        writer
            .write_record([
                row.nisn.clone(),
                row.nama_siswa.clone(),
                row.nama_kelas.clone(),
                row.total_hadir.to_string(),
                row.total_absen.to_string(),
                row.total_absensi_dicatat.to_string(),
            ])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| AbsensiError::Error(format!("CSV export failed: {}", e)))
}

/// Download name for a recap export, e.g. `rekap-absensi_2024-09-01_2024-09-30.csv`.
pub fn file_name(filter: &RecapFilter) -> String {
    match filter.date_range {
        Some((start, end)) => format!(
            "rekap-absensi_{}_{}.csv",
            format_date(start),
            format_date(end)
        ),
        None => "rekap-absensi.csv".to_string(),
    }
}

fn csv_error(e: csv::Error) -> AbsensiError {
    AbsensiError::Error(format!("CSV export failed: {}", e))
}
