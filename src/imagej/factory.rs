use std::path::Path;

use crate::imagej::command::Invocation;
use crate::models::task::{Task, TaskKind};

pub const MAP_CREATOR_MACRO: &str = "MapCreator";
pub const OBJECT_DETECTOR_MACRO: &str = "ObjectDetector";
pub const HOLES_DETECTOR_MACRO: &str = "HolesDetector";
pub const CROP_MACRO: &str = "CropImage";

/// How the source of a detection is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayersMode {
    SingleImage,
    Folder,
    ImageList,
}

impl LayersMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            LayersMode::SingleImage => "single_image",
            LayersMode::Folder => "folder",
            LayersMode::ImageList => "image_list",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" | "single" | "single_image" => Some(LayersMode::SingleImage),
            "folder" => Some(LayersMode::Folder),
            "list" | "image_list" => Some(LayersMode::ImageList),
            _ => None,
        }
    }
}

/// Raw user input for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRequest {
    MapCreation {
        source: String,
        is_map: bool,
        is_folder: bool,
    },
    ObjectDetection {
        source: String,
        mode: LayersMode,
    },
    HolesDetection {
        source: String,
        mode: LayersMode,
    },
    Crop {
        source: String,
    },
    LaunchImageJ {
        console: bool,
    },
}

impl TaskRequest {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskRequest::MapCreation { .. } => TaskKind::MapCreation,
            TaskRequest::ObjectDetection { .. } => TaskKind::ObjectDetection,
            TaskRequest::HolesDetection { .. } => TaskKind::HolesDetection,
            TaskRequest::Crop { .. } => TaskKind::Crop,
            TaskRequest::LaunchImageJ { .. } => TaskKind::Interactive,
        }
    }
}

/// Turns a request into a ready-to-run task. No I/O happens here.
pub fn build(request: &TaskRequest) -> Task {
    let kind = request.kind();
    let (description, invocation) = match request {
        TaskRequest::MapCreation {
            source,
            is_map,
            is_folder,
        } => {
            let prefix = if *is_map { "Map" } else { "Layer" };
            let argument = format!(
                "{}#{}#{}",
                source,
                if *is_map { "map" } else { "layer" },
                if *is_folder { "folder" } else { "image" }
            );
            (
                format!("{}: {}", prefix, basename(source)),
                Invocation::batch(MAP_CREATOR_MACRO, argument),
            )
        }
        TaskRequest::ObjectDetection { source, mode } => (
            detection_description(source, *mode),
            Invocation::batch(OBJECT_DETECTOR_MACRO, format!("{}#{}", source, mode.as_arg())),
        ),
        TaskRequest::HolesDetection { source, mode } => (
            detection_description(source, *mode),
            Invocation::batch(HOLES_DETECTOR_MACRO, format!("{}#{}", source, mode.as_arg())),
        ),
        TaskRequest::Crop { source } => (
            format!("Image: {}", basename(source)),
            Invocation::batch(CROP_MACRO, source.clone()),
        ),
        TaskRequest::LaunchImageJ { console } => {
            ("ImageJ".to_string(), Invocation::interactive(*console))
        }
    };
    Task::new(description, kind, invocation)
}

fn detection_description(source: &str, mode: LayersMode) -> String {
    let name = basename(source);
    if mode == LayersMode::Folder {
        return format!("Folder: {}", name);
    }
    let is_list = Path::new(source)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    if is_list {
        format!("File: {}", name)
    } else {
        format!("Image: {}", name)
    }
}

fn basename(source: &str) -> String {
    let trimmed = source.trim_end_matches(['/', '\\']);
    Path::new(trimmed)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::TaskStatus;

    #[test]
    fn map_creation_descriptions() {
        let layer = build(&TaskRequest::MapCreation {
            source: "/x/img.tif".to_string(),
            is_map: false,
            is_folder: false,
        });
        assert_eq!(layer.description, "Layer: img.tif");
        assert_eq!(layer.kind, TaskKind::MapCreation);
        assert_eq!(layer.status, TaskStatus::Pending);

        let map = build(&TaskRequest::MapCreation {
            source: "/x/img.tif".to_string(),
            is_map: true,
            is_folder: false,
        });
        assert_eq!(map.description, "Map: img.tif");
    }

    #[test]
    fn map_creation_argument_carries_flags() {
        let task = build(&TaskRequest::MapCreation {
            source: "/x/tiles/a.tif".to_string(),
            is_map: false,
            is_folder: true,
        });
        let invocation = task.invocation();
        assert_eq!(invocation.macro_name, Some(MAP_CREATOR_MACRO));
        assert_eq!(invocation.argument.as_deref(), Some("/x/tiles/a.tif#layer#folder"));
    }

    #[test]
    fn object_detection_folder() {
        let task = build(&TaskRequest::ObjectDetection {
            source: "/data".to_string(),
            mode: LayersMode::Folder,
        });
        assert_eq!(task.description, "Folder: data");
        assert_eq!(task.invocation().argument.as_deref(), Some("/data#folder"));
        assert_eq!(task.invocation().macro_name, Some(OBJECT_DETECTOR_MACRO));
    }

    #[test]
    fn holes_detection_list_and_image() {
        let list = build(&TaskRequest::HolesDetection {
            source: "/x/list.txt".to_string(),
            mode: LayersMode::SingleImage,
        });
        assert_eq!(list.description, "File: list.txt");
        assert_eq!(list.invocation().macro_name, Some(HOLES_DETECTOR_MACRO));

        let image = build(&TaskRequest::HolesDetection {
            source: "/x/slice.png".to_string(),
            mode: LayersMode::ImageList,
        });
        assert_eq!(image.description, "Image: slice.png");
        assert_eq!(image.invocation().argument.as_deref(), Some("/x/slice.png#image_list"));
    }

    #[test]
    fn crop_description() {
        let task = build(&TaskRequest::Crop {
            source: "/big/mosaic.tif".to_string(),
        });
        assert_eq!(task.description, "Image: mosaic.tif");
        assert_eq!(task.kind, TaskKind::Crop);
        assert_eq!(task.invocation().argument.as_deref(), Some("/big/mosaic.tif"));
    }

    #[test]
    fn launch_imagej_has_no_macro() {
        let task = build(&TaskRequest::LaunchImageJ { console: true });
        assert_eq!(task.description, "ImageJ");
        assert_eq!(task.kind, TaskKind::Interactive);
        assert!(task.invocation().macro_name.is_none());
    }

    #[test]
    fn trailing_separator_is_ignored() {
        let task = build(&TaskRequest::ObjectDetection {
            source: "/data/".to_string(),
            mode: LayersMode::Folder,
        });
        assert_eq!(task.description, "Folder: data");
    }

    #[test]
    fn modes_parse_from_cli_words() {
        assert_eq!(LayersMode::parse("image"), Some(LayersMode::SingleImage));
        assert_eq!(LayersMode::parse("folder"), Some(LayersMode::Folder));
        assert_eq!(LayersMode::parse("list"), Some(LayersMode::ImageList));
        assert_eq!(LayersMode::parse("tree"), None);
    }
}
