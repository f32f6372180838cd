use std::io::Cursor;

use base64::Engine;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use log::info;
use qrcode::{EcLevel, QrCode};
use rusqlite::Connection;
use serde::Serialize;

use crate::error::AbsensiError;
use crate::students::Student;

/// Pixels per QR module
const MODULE_PX: u32 = 8;
/// Quiet zone around the symbol, in modules
const QUIET_ZONE_MODULES: u32 = 1;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrPayload {
    pub siswa_id: i64,
    pub nisn: String,
    pub qr_data_url: String,
}

/// Renders `content` as a PNG QR code and returns it as a data URL.
pub fn render_data_url(content: &str) -> Result<String, AbsensiError> {
    let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::H)
        .map_err(|e| AbsensiError::Error(format!("QR encoding failed: {}", e)))?;

    let symbol = code
        .render::<Luma<u8>>()
        .quiet_zone(false)
        .module_dimensions(MODULE_PX, MODULE_PX)
        .build();

    // The renderer's built-in quiet zone is four modules wide
    let margin = QUIET_ZONE_MODULES * MODULE_PX;
    let mut canvas = GrayImage::from_pixel(
        symbol.width() + 2 * margin,
        symbol.height() + 2 * margin,
        Luma([255]),
    );
    image::imageops::overlay(&mut canvas, &symbol, margin as i64, margin as i64);

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(canvas)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| AbsensiError::Error(format!("PNG encoding failed: {}", e)))?;

    Ok(format!(
        "{}{}",
        DATA_URL_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}

/// Renders the student's NISN and stores the image on the student record.
pub fn generate_for_student(conn: &Connection, student_id: i64) -> Result<QrPayload, AbsensiError> {
    let student = Student::get_by_id(conn, student_id)?
        .ok_or_else(|| AbsensiError::NotFound("Student not found".to_string()))?;

    let data_url = render_data_url(&student.nisn)?;
    Student::store_qr(conn, student.student_id, &data_url)?;
    info!("Generated QR code for student {} ({})", student.student_id, student.nisn);

    Ok(QrPayload {
        siswa_id: student.student_id,
        nisn: student.nisn,
        qr_data_url: data_url,
    })
}

/// The QR code of the student linked to `user_id`, rendered on first request.
pub fn for_student_user(conn: &Connection, user_id: i64) -> Result<QrPayload, AbsensiError> {
    let student = Student::get_by_user(conn, user_id)?
        .ok_or_else(|| AbsensiError::NotFound("No student record for this account".to_string()))?;

    match student.qr_data_url {
        Some(data_url) => Ok(QrPayload {
            siswa_id: student.student_id,
            nisn: student.nisn,
            qr_data_url: data_url,
        }),
        None => generate_for_student(conn, student.student_id),
    }
}
