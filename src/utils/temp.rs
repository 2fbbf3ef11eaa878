//! Модуль для работы с временными файлами
//!
//! Каждое задание рендеринга получает собственную изолированную рабочую
//! директорию, удаляемую при любом пути завершения.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;

/// Рабочая директория одного задания рендеринга
pub struct ScratchDir {
    /// Держатель директории; None если очистка отключена
    dir: Option<TempDir>,
    /// Путь к директории
    path: PathBuf,
}

impl ScratchDir {
    /// Создать новую рабочую директорию
    ///
    /// При `cleanup = false` директория остается на диске после завершения,
    /// что полезно при отладке фильтров ffmpeg.
    pub fn new(cleanup: bool) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("rendernova_").tempdir()?;
        if cleanup {
            let path = dir.path().to_path_buf();
            Ok(Self { dir: Some(dir), path })
        } else {
            let path = dir.into_path();
            log::debug!("Scratch dir will be kept at {}", path.display());
            Ok(Self { dir: None, path })
        }
    }

    /// Путь к рабочей директории
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Путь для нового файла с уникальным именем
    pub fn file(&self, prefix: &str, extension: &str) -> PathBuf {
        let file_name = format!("{}_{}.{}", prefix, uuid::Uuid::new_v4(), extension);
        self.path.join(file_name)
    }

    /// Признак того, что директория будет удалена при уничтожении объекта
    pub fn cleans_up(&self) -> bool {
        self.dir.is_some()
    }
}
