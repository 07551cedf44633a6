//! Demo records for a fresh database.

use ihos_core::error::IhosError;
use ihos_storage::{BusinessRepository, Employee, Hospital, Room};

/// Number of records inserted per kind.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub rooms: usize,
    pub employees: usize,
    pub hospitals: usize,
}

fn room(name: &str, capacity: u32, location: &str) -> Room {
    Room {
        id: None,
        name: name.to_string(),
        capacity,
        location: location.to_string(),
    }
}

fn employee(name: &str, department: &str, position: &str, email: &str) -> Employee {
    Employee {
        id: None,
        name: name.to_string(),
        department: department.to_string(),
        position: position.to_string(),
        email: email.to_string(),
    }
}

fn hospital(name: &str, province: &str, specialties: &str, level: &str) -> Hospital {
    Hospital {
        id: None,
        name: name.to_string(),
        province: province.to_string(),
        specialties: specialties.to_string(),
        level: level.to_string(),
    }
}

/// Insert the demo records. Kinds that already have rows are left alone.
pub fn seed_demo_data(repo: &BusinessRepository) -> Result<SeedReport, IhosError> {
    let mut report = SeedReport::default();

    if repo.list_rooms()?.is_empty() {
        for r in [
            room("Phòng họp A", 10, "Tầng 3"),
            room("Phòng họp B", 6, "Tầng 3"),
            room("Phòng họp C", 20, "Tầng 5"),
        ] {
            repo.add_room(&r)?;
            report.rooms += 1;
        }
    }

    if repo.list_employees()?.is_empty() {
        for e in [
            employee("Nguyễn Văn A", "Kỹ thuật", "Trưởng nhóm", "nva@ihos.vn"),
            employee("Trần Thị B", "Kỹ thuật", "Kỹ sư", "ttb@ihos.vn"),
            employee("Lê Văn C", "Kinh doanh", "Chuyên viên", "lvc@ihos.vn"),
            employee("Phạm Thị D", "Nhân sự", "Trưởng phòng", "ptd@ihos.vn"),
        ] {
            repo.add_employee(&e)?;
            report.employees += 1;
        }
    }

    if repo.search_hospitals_by_keyword("", 1)?.is_empty() {
        for h in [
            hospital("Bệnh viện Bạch Mai", "Hà Nội", "Nội khoa, Tim mạch", "Trung ương"),
            hospital("Bệnh viện Chợ Rẫy", "TP. Hồ Chí Minh", "Ngoại khoa, Ung bướu", "Trung ương"),
            hospital("Bệnh viện Đa khoa Đà Nẵng", "Đà Nẵng", "Đa khoa", "Tỉnh"),
        ] {
            repo.add_hospital(&h)?;
            report.hospitals += 1;
        }
    }

    Ok(report)
}
