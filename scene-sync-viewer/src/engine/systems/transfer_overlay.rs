use bevy::prelude::*;
use constants::render_settings::{OVERLAY_FONT_SIZE, OVERLAY_MARGIN_PX, OVERLAY_TEXT_COLOUR};
use std::collections::BTreeMap;

use crate::config::ViewerConfig;
use crate::engine::downloads::{FileCompletedEvent, TransferDirection, TransferProgressEvent};

#[derive(Component)]
pub struct TransferProgressText;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Progress {
    direction: TransferDirection,
    bytes: u64,
    total: u64,
}

/// Latest progress of every unfinished transfer.
#[derive(Resource, Default, Debug)]
pub struct TransferProgressBoard {
    transfers: BTreeMap<String, Progress>,
}

impl TransferProgressBoard {
    pub fn record(&mut self, event: &TransferProgressEvent) {
        if event.bytes >= event.total {
            self.transfers.remove(&event.transfer_id);
        } else {
            self.transfers.insert(
                event.transfer_id.clone(),
                Progress {
                    direction: event.direction,
                    bytes: event.bytes,
                    total: event.total,
                },
            );
        }
    }

    pub fn finish(&mut self, transfer_id: &str) {
        self.transfers.remove(transfer_id);
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn summary(&self) -> String {
        self.transfers
            .iter()
            .map(|(id, progress)| {
                let arrow = match progress.direction {
                    TransferDirection::Download => "↓",
                    TransferDirection::Upload => "↑",
                };
                let percent = progress.bytes as f64 * 100.0 / progress.total.max(1) as f64;
                format!("{arrow} {id}: {percent:.0}%")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn track_transfer_progress(
    mut progress: EventReader<TransferProgressEvent>,
    mut completed: EventReader<FileCompletedEvent>,
    mut board: ResMut<TransferProgressBoard>,
) {
    for event in progress.read() {
        board.record(event);
    }
    for event in completed.read() {
        board.finish(&event.file.transfer_id);
    }
}

pub fn spawn_transfer_overlay(mut commands: Commands, config: Res<ViewerConfig>) {
    if !config.show_overlay {
        return;
    }

    let [r, g, b] = OVERLAY_TEXT_COLOUR;
    commands
        .spawn(Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            ..default()
        })
        .with_children(|parent| {
            parent.spawn((
                Text::new(""),
                TextFont {
                    font_size: OVERLAY_FONT_SIZE,
                    ..default()
                },
                TextColor(Color::srgb(r, g, b)),
                Node {
                    position_type: PositionType::Absolute,
                    bottom: Val::Px(OVERLAY_MARGIN_PX),
                    right: Val::Px(OVERLAY_MARGIN_PX),
                    ..default()
                },
                TransferProgressText,
            ));
        });
}

pub fn update_transfer_overlay(
    board: Res<TransferProgressBoard>,
    mut query: Query<&mut Text, With<TransferProgressText>>,
) {
    if !board.is_changed() {
        return;
    }
    for mut text in &mut query {
        text.0 = board.summary();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(id: &str, direction: TransferDirection, bytes: u64, total: u64) -> TransferProgressEvent {
        TransferProgressEvent {
            transfer_id: id.into(),
            direction,
            bytes,
            total,
        }
    }

    #[test]
    fn board_keeps_only_unfinished_transfers() {
        let mut board = TransferProgressBoard::default();
        board.record(&progress("a", TransferDirection::Download, 50, 200));
        board.record(&progress("b", TransferDirection::Upload, 1, 4));
        assert_eq!(board.summary(), "↓ a: 25%\n↑ b: 25%");

        board.record(&progress("b", TransferDirection::Upload, 4, 4));
        board.finish("a");
        assert!(board.is_empty());
    }
}
